use std::net::SocketAddrV4;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use bootpd::{AddressBook, AllocationKind, AllocationRecord, BootpServer, Config, Result};

#[derive(Parser)]
#[command(name = "bootpd")]
#[command(author, version, about = "A BOOTP server driven by dhcpd.conf", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "/etc/dhcp/dhcpd.conf")]
    config: PathBuf,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Address and port to listen on.
    #[arg(long, default_value = "0.0.0.0:67")]
    listen: SocketAddrV4,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    Run,
    ShowConfig,
    ListReservations,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let config = Config::load(&cli.config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            info!("Starting BOOTP server with config: {:?}", cli.config);
            let server = BootpServer::new(config, cli.listen)?;

            tokio::select! {
                result = server.run() => result,
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal, stopping server...");
                    log_allocation_summary(&server.address_book().allocations().await);
                    Ok(())
                }
            }
        }
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::ListReservations => {
            let config = Arc::new(config);
            let book = AddressBook::new(Arc::clone(&config));
            let reservations: Vec<_> = book
                .allocations()
                .await
                .into_iter()
                .filter(AllocationRecord::is_static)
                .collect();

            if reservations.is_empty() {
                println!("No static reservations.");
            } else {
                println!(
                    "{:<20} {:<16} {:<20}",
                    "Hardware Address", "IP Address", "Subnet"
                );
                println!("{}", "-".repeat(56));

                for record in reservations {
                    let subnet = record
                        .subnet
                        .and_then(|index| config.subnets.get(index))
                        .map(|subnet| format!("{}/{}", subnet.network, subnet.netmask))
                        .unwrap_or_else(|| "global".to_string());

                    println!(
                        "{:<20} {:<16} {:<20}",
                        record.hardware_address, record.address, subnet
                    );
                }
            }

            Ok(())
        }
    }
}

fn log_allocation_summary(allocations: &[AllocationRecord]) {
    let now = Utc::now();
    let mut served_static = 0;
    let mut live_leases = 0;

    for record in allocations {
        match record.kind {
            AllocationKind::Static { active: true } => served_static += 1,
            AllocationKind::Dynamic { .. } if !record.is_expired_at(now) => live_leases += 1,
            _ => {}
        }
    }

    info!(
        "Allocation table: {} record(s), {} static client(s) served, {} live dynamic lease(s)",
        allocations.len(),
        served_static,
        live_leases
    );
}
