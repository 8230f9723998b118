use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Pair a messaging account with the remote connection service
#[derive(Parser, Debug)]
#[command(name = "pairlink")]
#[command(version, about = "Pair a messaging account with the remote connection service")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the settings file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the remote service base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a connection and follow it until it is paired
    Connect {
        /// Connection name
        name: String,

        /// Profile the connection answers messages with
        #[arg(short, long)]
        profile: String,

        #[command(flatten)]
        watch: WatchArgs,
    },

    /// Follow the connection left running by a previous run
    Resume {
        #[command(flatten)]
        watch: WatchArgs,
    },

    /// Terminate a connection on the remote service
    Disconnect {
        /// Connection name
        name: String,
    },

    /// List stored connections
    Connections,

    /// List profiles a connection can be bound to
    Profiles,

    /// Show the settings file and effective values
    Settings {
        /// Write the effective settings back to the file
        #[arg(long)]
        write_defaults: bool,
    },
}

#[derive(Args, Clone, Debug, Default)]
pub struct WatchArgs {
    /// Write each new pairing code as a PNG image to this file
    #[arg(long)]
    pub qr_out: Option<PathBuf>,

    /// Terminate the connection on the remote service on Ctrl-C
    #[arg(long)]
    pub disconnect_on_exit: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_args() {
        let cli = Cli::try_parse_from([
            "pairlink",
            "connect",
            "MainOffice",
            "--profile",
            "support",
            "--qr-out",
            "/tmp/qr.png",
        ])
        .unwrap();
        match cli.command {
            Command::Connect {
                name,
                profile,
                watch,
            } => {
                assert_eq!(name, "MainOffice");
                assert_eq!(profile, "support");
                assert_eq!(watch.qr_out, Some(PathBuf::from("/tmp/qr.png")));
                assert!(!watch.disconnect_on_exit);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn connect_requires_profile() {
        assert!(Cli::try_parse_from(["pairlink", "connect", "MainOffice"]).is_err());
    }

    #[test]
    fn global_overrides_after_subcommand() {
        let cli = Cli::try_parse_from([
            "pairlink",
            "profiles",
            "--base-url",
            "http://10.0.0.2:3000/api/whatsapp",
            "-c",
            "/etc/pairlink.json",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Profiles));
        assert_eq!(
            cli.base_url.as_deref(),
            Some("http://10.0.0.2:3000/api/whatsapp")
        );
        assert_eq!(cli.config, Some(PathBuf::from("/etc/pairlink.json")));
    }

    #[test]
    fn resume_disconnect_on_exit() {
        let cli = Cli::try_parse_from(["pairlink", "resume", "--disconnect-on-exit"]).unwrap();
        match cli.command {
            Command::Resume { watch } => assert!(watch.disconnect_on_exit),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
