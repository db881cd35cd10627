// Stepwise - Java Execution Visualizer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Stepwise - step-by-step execution traces of Java snippets.
//!
//! `stepwise serve` exposes the tracer over HTTP; `stepwise trace` traces one
//! file and prints the trace document as JSON.

use clap::{Parser, Subcommand};
use eyre::Result;
use std::{path::PathBuf, time::Duration};
use tracing::Level;

use stepwise_engine::{OutputSink, TracerConfig};

mod cmd;

/// Command-line interface for Stepwise
#[derive(Debug, Parser)]
#[command(name = "stepwise")]
#[command(about = "Stepwise - step-by-step execution traces of Java snippets")]
#[command(version)]
pub struct Cli {
    /// JDK installation providing `java` and `javac` (default: from PATH)
    #[arg(long, env = "JAVA_HOME", global = true)]
    pub java_home: Option<PathBuf>,

    /// Wall-clock budget per input, in seconds
    #[arg(long, env = "STEPWISE_TIMEOUT_SECS", default_value = "15", global = true)]
    pub timeout_secs: u64,

    /// Line steps recorded before a run is cut short
    #[arg(long, env = "STEPWISE_MAX_STEPS", default_value = "3000", global = true)]
    pub max_steps: usize,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Serve traces over HTTP
    Serve {
        /// Address to listen on
        #[arg(long, env = "STEPWISE_HOST", default_value = "0.0.0.0")]
        host: String,

        /// Port to listen on
        #[arg(long, env = "STEPWISE_PORT", default_value = "8080")]
        port: u16,

        /// Trace sessions allowed to run at once
        #[arg(long, env = "STEPWISE_WORKERS", default_value = "10")]
        workers: usize,

        /// Also write logs to a file under the system temp directory
        #[arg(long)]
        log_file: bool,
    },
    /// Trace one source file and print the trace as JSON
    Trace {
        /// Java source file
        file: PathBuf,

        /// Argument text, also written to the program's stdin
        #[arg(long)]
        input: Option<String>,

        /// Title of the trace document
        #[arg(long)]
        title: Option<String>,
    },
}

impl Cli {
    /// Tracer settings shared by every command
    pub fn to_tracer_config(&self) -> TracerConfig {
        let mut config = TracerConfig::default()
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_max_steps(self.max_steps);
        if let Some(java_home) = &self.java_home {
            config = config.with_java_home(java_home);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let config = cli.to_tracer_config();

    match &cli.command {
        Commands::Serve { host, port, workers, log_file } => {
            stepwise_common::init_logging("stepwise", *log_file)?;
            let config = config.with_max_sessions(*workers);
            cmd::start_server(host, *port, config).await
        }
        Commands::Trace { file, input, title } => {
            // stdout carries the trace document only.
            stepwise_common::init_simple_logging(Level::WARN)?;
            let config = config.with_stdout_sink(OutputSink::Stderr);
            cmd::trace_file(file, input.clone(), title.clone(), config).await
        }
    }
}
