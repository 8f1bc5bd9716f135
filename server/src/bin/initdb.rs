//! `initdb`: bootstraps a fresh data directory with a meta database and a
//! super-admin user (spec §6 CLI), the way the teacher's `binlog_cli`
//! separates one-shot setup from the long-running service binary.
//!
//! Exit codes: `0` success, `1` bad arguments or an existing data directory.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use protocol::auth::{hash_password, AuthMethod};
use server::meta_db::write_bootstrap_hash;

#[derive(Parser, Debug)]
#[command(name = "initdb")]
#[command(version)]
#[command(about = "Bootstraps a sqlited-server data directory")]
struct CliArgs {
    /// Directory to create the data directory layout under (spec-literal `-D`).
    #[arg(short = 'D', long = "data-dir", value_name = "DIR")]
    data_dir: PathBuf,

    /// Password for the bootstrapped super-admin user.
    #[arg(short = 'p', long, value_name = "PASSWORD")]
    password: String,
}

fn main() -> ExitCode {
    let args = CliArgs::parse();

    if args.data_dir.exists() {
        match std::fs::read_dir(&args.data_dir) {
            Ok(mut entries) if entries.next().is_some() => {
                eprintln!("data directory {:?} already exists and is not empty", args.data_dir);
                return ExitCode::from(1);
            }
            Err(e) => {
                eprintln!("cannot read data directory {:?}: {e}", args.data_dir);
                return ExitCode::from(1);
            }
            _ => {}
        }
    } else if let Err(e) = std::fs::create_dir_all(&args.data_dir) {
        eprintln!("cannot create data directory {:?}: {e}", args.data_dir);
        return ExitCode::from(1);
    }

    let hash = hash_password(&args.password, AuthMethod::Md5);
    if let Err(e) = write_bootstrap_hash(&args.data_dir, &hash) {
        eprintln!("cannot write bootstrap file: {e}");
        return ExitCode::from(1);
    }

    println!("initialized data directory {:?} with super-admin user 'root'@'%'", args.data_dir);
    ExitCode::from(0)
}
