// Copyright (c) 2025 Rajan Panneer Selvam
//
// Licensed under the Business Source License 1.1 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.mariadb.com/bsl11
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use clap::{Parser, Subcommand};
use kinesim::{api, config, utils};
use std::error::Error;

#[derive(Parser)]
#[command(name = "kinesim")]
#[command(about = "In-process emulator of AWS Kinesis Data Streams", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the emulator server
    Server {
        /// Plain HTTP port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// TLS port to listen on (overrides config)
        #[arg(long)]
        tls_port: Option<u16>,

        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Load configuration
    let mut config = config::load_config()?;

    // Initialize logging
    utils::logging::init_logger(&config);

    // Parse command line arguments
    let cli = Cli::parse();

    match cli.command {
        Commands::Server {
            port,
            tls_port,
            host,
        } => {
            if let Some(port) = port {
                config.server.plain_port = port;
            }
            if let Some(tls_port) = tls_port {
                config.server.tls_port = tls_port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            api::server::run_server(config).await?;
        }
    }

    Ok(())
}
