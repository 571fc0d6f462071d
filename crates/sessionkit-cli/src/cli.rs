//! Command-line arguments.

use clap::{Parser, Subcommand, ValueEnum};
use sessionkit_core::session::AuthRequirement;

#[derive(Parser, Debug)]
#[command(name = "sessionkit")]
#[command(version)]
#[command(about = "Sign in to a token-authenticated API and manage the session")]
pub struct Cli {
    /// API base URL (overrides the config file and SESSIONKIT_API_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub api_url: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the restored session
    Status,

    /// Sign in with email and password
    Login {
        #[arg(short, long, env = "SESSIONKIT_EMAIL")]
        email: String,

        /// Read from the terminal when omitted
        #[arg(long, env = "SESSIONKIT_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Create an account and sign in
    Register {
        #[arg(short, long)]
        email: String,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
    },

    /// Sign out
    Logout {
        /// Sign out of every device
        #[arg(long)]
        all: bool,
    },

    /// Fetch the signed-in user from the server
    Whoami,

    /// Renew the access token now
    Refresh,

    /// Show the profile, or update it when any field is given
    Profile {
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        avatar_url: Option<String>,
    },

    /// Change the password of the signed-in account
    ChangePassword,

    /// Reset a forgotten password
    ResetPassword {
        #[command(subcommand)]
        command: ResetCommand,
    },

    /// Confirm an email address
    VerifyEmail {
        /// Token from the verification email
        #[arg(required_unless_present = "resend")]
        token: Option<String>,

        /// Send the verification email again
        #[arg(long, conflicts_with = "token")]
        resend: bool,
    },

    /// Send an arbitrary request through the session
    Request {
        /// HTTP method (GET, POST, PUT, PATCH, DELETE)
        method: String,
        /// Path relative to the API base URL
        path: String,
        /// JSON request body
        #[arg(long, short)]
        data: Option<String>,
        /// Do not attach the access token
        #[arg(long)]
        no_auth: bool,
    },

    /// Check whether a route would be accessible
    Route {
        path: String,
        #[arg(long, value_enum, default_value_t = AuthArg::Public)]
        auth: AuthArg,
        /// Required role; repeat for alternatives
        #[arg(long = "role", value_name = "ROLE")]
        roles: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ResetCommand {
    /// Email a reset link
    Request { email: String },
    /// Set a new password with the token from the email
    Confirm { token: String },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthArg {
    Public,
    Required,
    Guest,
}

impl From<AuthArg> for AuthRequirement {
    fn from(arg: AuthArg) -> Self {
        match arg {
            AuthArg::Public => AuthRequirement::Public,
            AuthArg::Required => AuthRequirement::Required,
            AuthArg::Guest => AuthRequirement::Guest,
        }
    }
}
