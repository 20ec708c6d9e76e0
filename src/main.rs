#[macro_use]
extern crate log;

use probe::cli::App;
use probe::dest::Destination;
use probe::session::{self, Session};
use probe::transport::IcmpSocket;
use probe::{process_identifier, ProbeError};

fn main() {
    let config = match App::parse_args() {
        Ok(config) => config,
        Err(ProbeError::Usage(e)) => e.exit(),
        Err(e) => {
            error!("Could not parse provided argument: {}", e);
            std::process::exit(e.exit_code());
        }
    };

    trace!("Resolve destination");

    let dest = match Destination::resolve(&config.target, config.family) {
        Ok(dest) => dest,
        Err(e) => {
            error!("Could not resolve destination: {}", e);
            std::process::exit(e.exit_code());
        }
    };

    let transport = match IcmpSocket::open(dest.family(), config.ttl) {
        Ok(transport) => transport,
        Err(e) => {
            error!("Could not open ICMP socket: {}", e);
            std::process::exit(e.exit_code());
        }
    };

    let (canceller, token) = session::cancellation();
    if let Err(e) = ctrlc::set_handler(move || canceller.cancel()) {
        error!("Could not install signal handler: {}", e);
        std::process::exit(1);
    }

    trace!("Start probe session");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let runner = Session::new(transport, dest.host, dest.addr, process_identifier());

    if let Err(e) = runner.run(session::ticker(config.interval), token, &mut out) {
        error!("An error occurred during a running probe session: {}", e);
        std::process::exit(e.exit_code());
    }

    trace!("Shutting down...");
}
