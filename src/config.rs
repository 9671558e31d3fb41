//! Configuration and command-line argument parsing

use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    // Input
    /// SDR tool launched as the frame source.
    pub exec_path: String,
    /// Read frame lines from a file instead ('-' for stdin).
    pub ifile: Option<String>,

    // Processing
    pub fix_errors: bool,
    pub check_crc: bool,
    pub aggressive: bool,

    // Output
    pub raw: bool,
    pub onlyaddr: bool,
    pub metric: bool,
    pub interactive: bool,
    pub interactive_rows: usize,
    pub interactive_ttl: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exec_path: "rtl_adsb".to_string(),
            ifile: None,
            fix_errors: true,
            check_crc: true,
            aggressive: false,
            raw: false,
            onlyaddr: false,
            metric: false,
            interactive: false,
            interactive_rows: 15,
            interactive_ttl: 60,
        }
    }
}

impl Config {
    pub fn from_args() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut config = Config::default();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--exec" => {
                    i += 1;
                    if let Some(path) = args.get(i) {
                        config.exec_path = path.clone();
                    }
                }
                "--ifile" => {
                    i += 1;
                    config.ifile = args.get(i).cloned();
                }
                "--no-fix" => config.fix_errors = false,
                "--no-crc-check" => config.check_crc = false,
                "--aggressive" => config.aggressive = true,
                "--raw" => config.raw = true,
                "--onlyaddr" => config.onlyaddr = true,
                "--metric" => config.metric = true,
                "--imperial" => config.metric = false,
                "--interactive" => config.interactive = true,
                "--interactive-rows" => {
                    i += 1;
                    config.interactive_rows =
                        args.get(i).and_then(|s| s.parse().ok()).unwrap_or(15);
                }
                "--interactive-ttl" => {
                    i += 1;
                    config.interactive_ttl = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(60);
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown option: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
            i += 1;
        }

        config
    }
}

fn print_help() {
    println!(
        r#"sky1090 - Mode S decoder fed by an external SDR byte-line source

Usage: sky1090 [OPTIONS]

Options:
  --exec <path>          Frame source executable (default: rtl_adsb)
  --ifile <filename>     Read frame lines from file ('-' for stdin)
  --interactive          Interactive mode refreshing data on screen
  --interactive-rows <N> Max rows in interactive mode (default: 15)
  --interactive-ttl <s>  Remove aircraft if idle for <s> seconds (default: 60)
  --raw                  Show only messages hex values
  --onlyaddr             Show only ICAO addresses
  --metric               Use metric units
  --imperial             Use imperial units (default)
  --no-fix               Disable single-bit error correction
  --no-crc-check         Disable CRC check (discouraged)
  --aggressive           More CPU for more messages (two-bit repair)
  --help                 Show this help
"#
    );
}
