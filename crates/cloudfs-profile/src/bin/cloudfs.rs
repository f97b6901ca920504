//! cloudfs: manage and mount CloudFS profiles.
//!
//! # Usage
//!
//! ```bash
//! # Create a profile of the bundled demo service
//! cloudfs create-profile demo alice
//!
//! # Mount it at ~/CloudFS/alice until interrupted
//! cloudfs start demo alice
//! ```

use clap::{Parser, Subcommand};
use cloudfs_profile::{Profile, ServiceRegistry};
use env_logger::Env;
use log::{error, info};
use std::path::{Path, PathBuf};
use std::process;

/// Mount storage services as local filesystems.
#[derive(Parser, Debug)]
#[command(name = "cloudfs")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding profiles (default: ~/.cloudfs)
    #[arg(long, value_name = "DIR", global = true)]
    app_root: Option<PathBuf>,

    /// Directory under which profiles are mounted (default: ~/CloudFS)
    #[arg(long, value_name = "DIR", global = true)]
    mount_root: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available services
    ListServices,

    /// List created profiles
    ListProfiles,

    /// Create a profile
    CreateProfile {
        /// Service name
        service: String,
        /// Profile name
        profile: String,
    },

    /// Remove a profile and its cache
    RemoveProfile {
        /// Service name
        service: String,
        /// Profile name
        profile: String,
    },

    /// Mount a profile until it is unmounted
    Start {
        /// Service name
        service: String,
        /// Profile name
        profile: String,

        /// Mount read-only
        #[arg(long)]
        read_only: bool,
    },
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    let app_root = args.app_root.unwrap_or_else(|| home_path(".cloudfs"));
    let mount_root = args.mount_root.unwrap_or_else(|| home_path("CloudFS"));
    let registry = ServiceRegistry::builtin(mount_root);

    match args.command {
        Command::ListServices => {
            for name in registry.list_services() {
                println!("{}", name);
            }
        }
        Command::ListProfiles => match registry.profiles(&app_root) {
            Ok(profiles) => {
                for p in profiles {
                    println!(
                        "{}: '{}' - '{}' (v{})",
                        p.service_label.as_deref().unwrap_or("Unknown Service"),
                        p.service_name,
                        p.profile_name,
                        p.version.as_deref().unwrap_or("?")
                    );
                }
            }
            Err(e) => {
                error!("Failed to list profiles in {}: {}", app_root.display(), e);
                process::exit(1);
            }
        },
        Command::CreateProfile { service, profile } => {
            let profile = open_profile(&registry, &app_root, &service, &profile);
            if let Err(e) = profile.create() {
                error!("{}", e);
                process::exit(1);
            }
            info!(
                "Created profile '{}' - '{}' in {}",
                profile.service_name(),
                profile.profile_name(),
                profile.profile_path().display()
            );
        }
        Command::RemoveProfile { service, profile } => {
            let profile = open_profile(&registry, &app_root, &service, &profile);
            if let Err(e) = profile.remove() {
                error!("{}", e);
                process::exit(1);
            }
            info!(
                "Removed profile '{}' - '{}'",
                profile.service_name(),
                profile.profile_name()
            );
        }
        Command::Start {
            service,
            profile,
            read_only,
        } => {
            let profile = open_profile(&registry, &app_root, &service, &profile);
            if let Err(e) = profile.start(args.verbose, read_only) {
                error!("{}", e);
                process::exit(1);
            }
        }
    }
}

fn open_profile(
    registry: &ServiceRegistry,
    app_root: &Path,
    service: &str,
    profile: &str,
) -> Profile {
    match registry.profile(app_root, service, profile) {
        Ok(p) => p,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}

fn home_path(name: &str) -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(name),
        None => {
            error!("Cannot determine the home directory, pass --app-root and --mount-root");
            process::exit(1);
        }
    }
}
