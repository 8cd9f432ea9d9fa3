use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use log::info;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use rpihw::{ByteOrder, Gpio, HwConfig, HwError, I2cBus, Input, Output};

#[cfg(not(feature = "hardware"))]
use rpihw::{MockGpioBackend, MockI2cDevice};

#[derive(Parser)]
#[command(author, version, about = "Raspberry Pi GPIO and I2C access", long_about = None)]
struct Cli {
    /// JSON config file
    #[arg(long, env = "RPIHW_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the effective line range and bus device
    Info,
    /// Read the level of an input line
    Read {
        #[arg(value_parser = parse_int::<u32>)]
        line: u32,
    },
    /// Drive an output line
    Write {
        #[arg(value_parser = parse_int::<u32>)]
        line: u32,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=1))]
        level: u8,
    },
    /// Block until the next edge on an input line
    Wait {
        #[arg(value_parser = parse_int::<u32>)]
        line: u32,
    },
    /// Print every edge on an input line for a while
    Watch {
        #[arg(value_parser = parse_int::<u32>)]
        line: u32,
        seconds: u64,
    },
    /// Read a register from a bus device
    I2cRead {
        #[arg(value_parser = parse_int::<u16>)]
        address: u16,
        #[arg(value_parser = parse_int::<u8>)]
        register: u8,
        width: Width,
        #[arg(long)]
        lsb_first: bool,
    },
    /// Write a register on a bus device
    I2cWrite {
        #[arg(value_parser = parse_int::<u16>)]
        address: u16,
        #[arg(value_parser = parse_int::<u8>)]
        register: u8,
        width: Width,
        #[arg(value_parser = parse_int::<u64>)]
        value: u64,
        #[arg(long)]
        lsb_first: bool,
    },
}

/// Register width in bytes.
#[derive(Clone, Copy, ValueEnum)]
enum Width {
    #[value(name = "1")]
    Byte,
    #[value(name = "2")]
    Word,
    #[value(name = "4")]
    Dword,
    #[value(name = "8")]
    Qword,
}

impl Width {
    fn bytes(self) -> usize {
        match self {
            Width::Byte => 1,
            Width::Word => 2,
            Width::Dword => 4,
            Width::Qword => 8,
        }
    }
}

/// Decimal or `0x`-prefixed hex.
fn parse_int<T: TryFrom<u64>>(text: &str) -> Result<T, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    let value = parsed.map_err(|e| format!("`{text}`: {e}"))?;
    T::try_from(value).map_err(|_| format!("`{text}` is out of range"))
}

/// Narrows a register value to the selected width, exiting with a usage error
/// when it does not fit.
fn narrow<T: TryFrom<u64>>(value: u64, width: Width) -> T {
    T::try_from(value).unwrap_or_else(|_| {
        Cli::command()
            .error(
                ErrorKind::ValueValidation,
                format!("0x{value:x} does not fit in {} byte(s)", width.bytes()),
            )
            .exit()
    })
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => match HwConfig::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{e}");
                return ExitCode::FAILURE;
            }
        },
        None => HwConfig::default(),
    };

    match run(&config, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn gpio(config: &HwConfig) -> Gpio {
    #[cfg(feature = "hardware")]
    {
        Gpio::sysfs(config.gpio.clone())
    }
    #[cfg(not(feature = "hardware"))]
    {
        Gpio::new(config.gpio.clone(), Arc::new(MockGpioBackend::default()))
    }
}

fn bus(config: &HwConfig) -> Result<Arc<I2cBus>, HwError> {
    #[cfg(feature = "hardware")]
    {
        I2cBus::shared_with(&config.i2c)
    }
    #[cfg(not(feature = "hardware"))]
    {
        let device = MockI2cDevice::new();
        Ok(Arc::new(I2cBus::with_device(
            config.i2c.device_path().display().to_string(),
            Box::new(device),
        )))
    }
}

fn run(config: &HwConfig, command: Command) -> Result<(), HwError> {
    match command {
        Command::Info => {
            println!(
                "gpio: {} lines {}..={}",
                config.gpio.sysfs_root.display(),
                config.gpio.min_line,
                config.gpio.max_line
            );
            println!(
                "i2c: {} (SDA on GPIO {}, SCL on GPIO {})",
                config.i2c.device_path().display(),
                config.i2c.sda_line,
                config.i2c.scl_line
            );
        }
        Command::Read { line } => {
            let input = gpio(config).input(line)?;
            println!("{}", u8::from(input.read_value()?));
        }
        Command::Write { line, level } => {
            let output = gpio(config).output(line)?;
            output.write_value(level == 1)?;
        }
        Command::Wait { line } => {
            let input = gpio(config).input(line)?;
            println!("{}", u8::from(input.wait_for_change()?));
        }
        Command::Watch { line, seconds } => {
            let input = gpio(config).input(line)?;
            input.subscribe(move |level| println!("GPIO {line}: {}", u8::from(*level)));
            input.start()?;
            info!("watching GPIO {line} for {seconds}s");
            std::thread::sleep(Duration::from_secs(seconds));
            input.stop()?;
        }
        Command::I2cRead {
            address,
            register,
            width,
            lsb_first,
        } => {
            let order = ByteOrder::from_invert(lsb_first);
            let bus = bus(config)?;
            let mut tx = bus.begin_transaction(address)?;
            let value = match width {
                Width::Byte => u64::from(tx.read_register::<u8>(register, order)?),
                Width::Word => u64::from(tx.read_register::<u16>(register, order)?),
                Width::Dword => u64::from(tx.read_register::<u32>(register, order)?),
                Width::Qword => tx.read_register::<u64>(register, order)?,
            };
            println!("0x{value:0w$x}", w = width.bytes() * 2);
        }
        Command::I2cWrite {
            address,
            register,
            width,
            value,
            lsb_first,
        } => {
            let order = ByteOrder::from_invert(lsb_first);
            let bus = bus(config)?;
            let mut tx = bus.begin_transaction(address)?;
            match width {
                Width::Byte => tx.write_register::<u8>(register, narrow(value, width), order)?,
                Width::Word => tx.write_register::<u16>(register, narrow(value, width), order)?,
                Width::Dword => tx.write_register::<u32>(register, narrow(value, width), order)?,
                Width::Qword => tx.write_register(register, value, order)?,
            }
        }
    }

    Ok(())
}
