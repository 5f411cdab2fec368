//! Command-line arguments.

use std::path::PathBuf;

use applink_types::DEFAULT_MODEL;
use clap::{Args, Parser, Subcommand};

pub const DEFAULT_SERVER: &str = "http://127.0.0.1:3000";
const CREDENTIALS_FILE: &str = "credentials.json";

#[derive(Debug, Parser)]
#[command(name = "applink")]
#[command(version)]
#[command(about = "Turn a prompt into a React app", long_about = None)]
pub struct Cli {
    /// Base URL of the applink-server instance
    #[arg(long, env = "APPLINK_SERVER", default_value = DEFAULT_SERVER, global = true)]
    pub server: String,

    /// Where the session token is kept (default: <config dir>/applink/credentials.json)
    #[arg(long, env = "APPLINK_CREDENTIALS", global = true)]
    pub credentials: Option<PathBuf>,

    /// Connect and per-read timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Log debug output to stderr
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate a component from a description and print it
    #[command(alias = "g")]
    Generate {
        /// What the app should do
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,

        #[arg(long, default_value = DEFAULT_MODEL)]
        model: String,

        /// Write the code here instead of stdout
        #[arg(long, short)]
        out: Option<PathBuf>,
    },

    /// Apply a change request to the code in a file and print the result
    #[command(alias = "m")]
    Modify {
        /// File holding the current code
        #[arg(long, short)]
        file: PathBuf,

        /// The change to make
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,

        /// Model used for the edit (server default when omitted)
        #[arg(long)]
        model: Option<String>,

        /// Rewrite `file` with the result
        #[arg(long)]
        in_place: bool,
    },

    /// Store the code in a file under an existing generation id
    Save {
        #[arg(long)]
        id: String,

        #[arg(long, short)]
        file: PathBuf,
    },

    /// Print a stored generation
    Show { id: String },

    /// Sign in and remember the session
    Signin(SignInArgs),

    /// Create an account and remember the session
    Signup(SignUpArgs),

    /// Forget the stored session
    Signout,

    /// Show the signed-in user
    Whoami {
        /// Ask the server whether the token is still valid
        #[arg(long)]
        remote: bool,
    },

    /// List the selectable models
    Models,

    /// Interactive session: generate once, then refine with follow-up prompts
    Studio {
        #[arg(long, default_value = DEFAULT_MODEL)]
        model: String,

        /// Quiet period before a queued change is sent, in milliseconds
        #[arg(long, default_value_t = 500)]
        quiet_ms: u64,
    },
}

#[derive(Debug, Args)]
pub struct SignInArgs {
    #[arg(long)]
    pub email: String,

    #[arg(long, env = "APPLINK_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Debug, Args)]
pub struct SignUpArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub email: String,

    #[arg(long, env = "APPLINK_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Defaults to `--password`
    #[arg(long)]
    pub confirm_password: Option<String>,
}

impl Cli {
    pub fn credentials_path(&self) -> PathBuf {
        if let Some(path) = &self.credentials {
            return path.clone();
        }
        match dirs_next::config_dir() {
            Some(dir) => dir.join("applink").join(CREDENTIALS_FILE),
            None => PathBuf::from(".applink").join(CREDENTIALS_FILE),
        }
    }
}
