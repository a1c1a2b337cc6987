use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use oomprio_core::{GroupSnapshot, Propagation, VERSION};
use oomprio_daemon::{Config, GroupManager, GroupPath, HierarchyStats};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "oomprio")]
#[command(author = "OOMPrio Team")]
#[command(version = VERSION)]
#[command(about = "OOM priority hierarchy - CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the hierarchy built from a configuration file
    Show {
        /// Path to configuration file
        #[arg(short, long, default_value = "/etc/oomprio/config.toml")]
        config: PathBuf,

        /// Print JSON instead of a tree
        #[arg(long)]
        json: bool,
    },

    /// List groups by effective priority, first victim first
    Rank {
        /// Path to configuration file
        #[arg(short, long, default_value = "/etc/oomprio/config.toml")]
        config: PathBuf,
    },

    /// Write one group's priority on top of a configuration and show the result
    Set {
        /// Path to configuration file
        #[arg(short, long, default_value = "/etc/oomprio/config.toml")]
        config: PathBuf,

        /// Group path, e.g. /apps/background
        path: GroupPath,

        /// New priority
        #[arg(allow_negative_numbers = true)]
        value: i64,
    },

    /// Follow the stats file written by the daemon (updates every 2 seconds)
    Watch {
        /// Path to the daemon stats file
        #[arg(short, long, default_value = "./logs/stats.json")]
        stats: PathBuf,
    },

    /// Show version information
    Version,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Show { config, json }) => show(&config, json),
        Some(Commands::Rank { config }) => rank(&config),
        Some(Commands::Set {
            config,
            path,
            value,
        }) => set(&config, &path, value),
        Some(Commands::Watch { stats }) => {
            println!("{}", "=== OOMPrio Watch Mode ===".green().bold());
            println!("Press Ctrl+C to exit...\n");
            watch_mode(&stats)
        }
        Some(Commands::Version) => {
            println!("OOMPrio v{}", VERSION);
            println!("Hierarchical OOM priority overrides");
            Ok(())
        }
        None => show(Path::new("/etc/oomprio/config.toml"), false),
    };

    if let Err(e) = result {
        eprintln!("{}", format!("❌ {:#}", e).red());
        std::process::exit(1);
    }
}

fn load_manager(path: &Path) -> Result<GroupManager> {
    let config = Config::load_from_file(path)
        .with_context(|| format!("Failed to load configuration file {:?}", path))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;
    Ok(GroupManager::from_config(&config)?)
}

fn show(config: &Path, json: bool) -> Result<()> {
    let manager = load_manager(config)?;

    if json {
        let groups: Vec<serde_json::Value> = manager
            .snapshot_by_path()
            .into_iter()
            .map(|(path, group)| {
                serde_json::json!({
                    "path": path.to_string(),
                    "depth": group.depth,
                    "priority": group.priority,
                    "effective_priority": group.effective_priority,
                })
            })
            .collect();
        let doc = serde_json::json!({
            "cpuset_constraint": manager.hierarchy().read_constraint(),
            "groups": groups,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("{}", "=== OOMPrio Hierarchy ===".green().bold());
    print_tree(&manager);
    Ok(())
}

fn print_tree(manager: &GroupManager) {
    for (path, group) in manager.snapshot_by_path() {
        let label = if path.is_root() {
            "/".to_string()
        } else {
            path.name().unwrap_or_default().to_string()
        };
        println!(
            "{}{:<24} {}",
            "  ".repeat(group.depth),
            label,
            describe(&group)
        );
    }

    let constraint = if manager.hierarchy().read_constraint() {
        "on".green()
    } else {
        "off".dimmed()
    };
    println!("\ncpuset constraint: {}\n", constraint);
}

fn describe(group: &GroupSnapshot) -> String {
    if group.effective_priority > group.priority {
        format!(
            "priority={} effective={} {}",
            group.priority,
            group.effective_priority.to_string().yellow(),
            "(inherited)".dimmed()
        )
    } else {
        format!(
            "priority={} effective={}",
            group.priority,
            group.effective_priority.to_string().cyan()
        )
    }
}

fn rank(config: &Path) -> Result<()> {
    let manager = load_manager(config)?;
    let mut groups = manager.snapshot_by_path();
    groups.sort_by(|a, b| b.1.effective_priority.cmp(&a.1.effective_priority));

    println!("{}", "=== OOMPrio Ranking ===".green().bold());
    for (position, (path, group)) in groups.iter().enumerate() {
        let marker = if position == 0 {
            "🔥".to_string()
        } else {
            format!("{:>2}", position + 1)
        };
        println!(
            "  {} {:<32} effective={}",
            marker,
            path.to_string(),
            group.effective_priority
        );
    }
    println!();
    Ok(())
}

fn set(config: &Path, path: &GroupPath, value: i64) -> Result<()> {
    let manager = load_manager(config)?;
    let propagation = manager.write_priority(path, value)?;

    match propagation {
        Propagation::None => {
            println!("{}", format!("✅ {} already at {}", path, value).green());
        }
        Propagation::Increased { target, visited } => {
            println!(
                "{}",
                format!("⬆️  {} raised, {} groups now at least {}", path, visited, target).cyan()
            );
        }
        Propagation::Decreased { floor, visited } => {
            println!(
                "{}",
                format!("⬇️  {} lowered to floor {}, {} groups visited", path, floor, visited)
                    .yellow()
            );
        }
    }
    println!();

    print_tree(&manager);
    Ok(())
}

fn show_stats(path: &Path) -> Result<()> {
    let stats = HierarchyStats::load_from_file(path)
        .with_context(|| format!("Failed to read stats file {:?}", path))?;

    println!(
        "Updated {} | runtime {}s | reconciles {} | groups {}",
        stats.timestamp.format("%H:%M:%S"),
        stats.runtime_secs,
        stats.reconciles,
        stats.total_groups
    );
    println!(
        "Propagation: writes={} increases={} decreases={} visited={}\n",
        stats.propagation.writes,
        stats.propagation.increases,
        stats.propagation.decreases,
        stats.propagation.nodes_visited
    );
    for group in &stats.groups {
        println!(
            "  {:<32} priority={:<6} effective={}",
            group.path,
            group.priority,
            group.effective_priority.to_string().cyan()
        );
    }
    println!();
    Ok(())
}

fn watch_mode(path: &Path) -> Result<()> {
    loop {
        // Clear screen
        print!("\x1B[2J\x1B[1;1H");

        if let Err(e) = show_stats(path) {
            println!("{}", format!("⚠️  {:#}", e).yellow());
        }

        std::thread::sleep(std::time::Duration::from_secs(2));
    }
}
