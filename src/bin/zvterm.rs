use anyhow::{anyhow, Result};
use clap::Parser as _;
use owo_colors::OwoColorize;
use tracing::{debug, trace};
use zvterm::ecr::{parse_represented, Represented};
use zvterm::types::ConfigByte;
use zvterm::Ecr;

#[derive(clap::Parser, Debug)]
struct Args {
    /// Increase log level.
    #[arg(short, long, action=clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease log level.
    #[arg(short, long, action=clap::ArgAction::Count)]
    quiet: u8,

    /// PT device: a serial device path, or socket://<host>:<port>.
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    device: String,

    /// Terminal password.
    #[arg(short, long, default_value = "123456")]
    password: String,

    /// Command.
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Register at the PT and show its status.
    Status,

    /// Run a payment.
    Pay {
        /// Amount in cents.
        amount: u64,
    },

    /// Run the end-of-day cycle and print the day log.
    EndOfDay,

    /// Show text lines on the PT display.
    Display {
        /// Up to four lines of text.
        lines: Vec<String>,
    },

    /// Decode a hex dump (framed serial message or bare APDU).
    Decode {
        /// Hex bytes, whitespace ignored.
        dump: Vec<String>,
    },
}

impl Command {
    pub fn run(&self, args: &Args) -> Result<()> {
        match self {
            Self::Status => self.status(args),
            Self::Pay { amount } => self.pay(args, *amount),
            Self::EndOfDay => self.end_of_day(args),
            Self::Display { lines } => self.display(args, lines),
            Self::Decode { dump } => self.decode(&dump.join("")),
        }
    }

    fn connect(&self, args: &Args) -> Result<Ecr> {
        debug!(device = args.device, "Connecting");
        let mut ecr = Ecr::connect(&args.device, &args.password)?;
        ecr.register(ConfigByte::DEFAULT)?;
        Ok(ecr)
    }

    fn status(&self, args: &Args) -> Result<()> {
        let mut ecr = self.connect(args)?;
        let status = ecr
            .status()?
            .ok_or_else(|| anyhow!("PT did not answer the status enquiry"))?;
        println!("{:02X} {}", status, ecr.status_text());
        if let Some(version) = &ecr.version {
            println!("software: {}", version);
        }
        if let Some(tid) = &ecr.terminal_id {
            println!("terminal: {}", tid);
        }
        Ok(())
    }

    fn pay(&self, args: &Args, amount: u64) -> Result<()> {
        let mut ecr = self.connect(args)?;
        if ecr.payment(amount)? {
            println!("{}", "payment successful".green());
            for line in ecr.last_printout() {
                println!("{}", line);
            }
            Ok(())
        } else {
            println!("{}", "payment declined".red());
            Err(anyhow!("payment did not go through"))
        }
    }

    fn end_of_day(&self, args: &Args) -> Result<()> {
        let mut ecr = self.connect(args)?;
        let outcome = ecr.end_of_day()?;
        if outcome.code() != 0 {
            return Err(anyhow!("end-of-day aborted with code {}", outcome.code()));
        }
        for line in ecr.last_printout() {
            println!("{}", line);
        }
        Ok(())
    }

    fn display(&self, args: &Args, lines: &[String]) -> Result<()> {
        let mut ecr = self.connect(args)?;
        let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
        ecr.show_text(&lines, 5, 0)?;
        Ok(())
    }

    fn decode(&self, dump: &str) -> Result<()> {
        match parse_represented(dump)? {
            Represented::Ack => println!("ACK"),
            Represented::Nak => println!("NAK"),
            Represented::Packet(packet) => {
                println!("{}", packet.schema().name.bold());
                for (name, value) in packet.items() {
                    println!("  {} = {:?}", name, value);
                }
            }
        }
        Ok(())
    }
}

fn init_logging(args: &Args) {
    tracing_subscriber::fmt()
        .without_time()
        .with_target(false)
        .with_max_level(match 2 + args.verbose - args.quiet {
            0 => tracing::Level::ERROR,
            1 => tracing::Level::WARN,
            2 => tracing::Level::INFO,
            3 => tracing::Level::DEBUG,
            4.. => tracing::Level::TRACE,
        })
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);
    trace!(?args, "Starting up");
    args.command.run(&args)
}
