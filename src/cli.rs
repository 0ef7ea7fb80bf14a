use clap::{Parser, Subcommand};

/// photoframe: Google Photos Picker slideshow for a kiosk display
#[derive(Parser)]
#[command(name = "photoframe", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the web server
    Serve {
        /// Port to bind (overrides PHOTOFRAME_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Inspect or reset the saved selection
    Selection {
        #[command(subcommand)]
        command: SelectionCommands,
    },

    /// Inspect or drop the stored Google credentials
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
}

#[derive(Subcommand)]
pub enum SelectionCommands {
    /// List the selected items in slideshow order
    Show,
    /// Delete the selection file
    Clear,
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Show whether a usable refresh token is on file
    Status,
    /// Delete the stored tokens
    Logout,
}
