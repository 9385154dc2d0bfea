use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "condo", about = "Smart condominium API client")]
pub struct Opt {
    /// Config file path
    #[arg(short, long, value_parser, default_value = "config.toml")]
    pub config: clio::Input,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Logs in and stores the session credentials
    Login { email: String, password: String },
    /// Ends the session
    Logout,
    /// Shows the identity of the logged in user
    Whoami,
    /// Refreshes the access token
    Refresh,
    /// Sends an authenticated request and prints the response body
    Request {
        /// HTTP method
        method: String,
        /// Path relative to the API base url
        path: String,
        /// JSON request body
        #[arg(long)]
        body: Option<String>,
        /// Requested page of a paginated collection
        #[arg(long)]
        page: Option<u32>,
        /// Page size of a paginated collection
        #[arg(long)]
        page_size: Option<u32>,
    },
    /// Uploads a file as multipart form
    Upload {
        /// Path relative to the API base url
        path: String,
        /// File to upload
        file: PathBuf,
    },
    /// Downloads a response body into a file
    Download {
        /// Path relative to the API base url
        path: String,
        /// Destination file
        output: PathBuf,
    },
}
