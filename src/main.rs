use clap::Parser;
use rrmark::config::{self, Config};
use rrmark::handler::PacketHandler;
use rrmark::mark::MarkAllocator;
use rrmark::queue::NfQueue;
use rrmark::service::Service;
use rrmark::telemetry::init_logging;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "rrmark")]
#[command(about = "Round-robin connection marker for Linux NFQUEUE")]
struct Cli {
    /// NFQUEUE number to bind (default 0)
    #[arg(long)]
    queue_num: Option<u16>,

    /// Number of distinct marks to cycle through (default 3)
    #[arg(long)]
    marks: Option<u32>,

    /// Log each packet: id, interfaces, payload dump, endpoints
    #[arg(long)]
    log_packet: bool,

    /// Log each mark selection
    #[arg(long)]
    log_mark: bool,

    /// Optional TOML config file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("[ERROR] {}", e);
            std::process::exit(1);
        }
    };

    init_logging(Some(&config.log));

    if let Err(e) = run(&config) {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

fn build_config(cli: &Cli) -> rrmark::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => config::load(path)?,
        None => Config::default(),
    };

    if let Some(queue_num) = cli.queue_num {
        config.queue_num = queue_num;
    }
    if let Some(marks) = cli.marks {
        config.marks = marks;
    }
    if cli.log_packet {
        config.log_packet = true;
    }
    if cli.log_mark {
        config.log_mark = true;
    }

    config.validate()?;
    Ok(config)
}

fn run(config: &Config) -> rrmark::Result<()> {
    let allocator = MarkAllocator::new(config.marks)?;
    let handler = PacketHandler::new(allocator, config.log_packet, config.log_mark);

    let rt = tokio::runtime::Runtime::new().map_err(rrmark::Error::Io)?;
    rt.block_on(async {
        let mut queue = NfQueue::open()?;
        queue.create_queue(config.queue_num)?;

        info!(
            queue_num = config.queue_num,
            marks = config.marks,
            "queue is active, add an iptables rule to feed it, for example:"
        );
        info!(
            "\tiptables -t mangle -I PREROUTING 1 [-i eth0] -m conntrack --ctstate NEW -j NFQUEUE --queue-num {}",
            config.queue_num
        );

        let mut service = Service::new(queue, handler);
        service.run().await
        // Dropping the service closes the queue: unbind happens before the
        // process exits.
    })
}
