use clap::{Parser, Subcommand};

/// gnmilite - gNMI-style Capabilities/Get/Set/Subscribe over a schema-typed tree
#[derive(Parser, Debug)]
#[command(name = "gnmilite")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the four RPCs as JSON-Lines over stdio or TCP
    Serve {
        /// Serve one session over stdin/stdout instead of listening on TCP
        #[arg(long, default_value = "false", conflicts_with = "listen")]
        stdio: bool,

        /// TCP listen address (default: from env or 127.0.0.1:9339)
        #[arg(long, value_name = "HOST:PORT")]
        listen: Option<String>,

        /// Module definition file (.json, .yaml, .yml). Repeatable; replaces GNMILITE_MODELS
        #[arg(long = "model", value_name = "FILE")]
        models: Vec<String>,

        /// Maximum size of one request line in bytes (default: from env or 10 MiB)
        #[arg(long, value_name = "BYTES")]
        max_request_bytes: Option<usize>,
    },

    /// Load module definition files and list the modules they define
    Check {
        /// Module definition files
        #[arg(value_name = "FILE", required = true)]
        models: Vec<String>,
    },
}
