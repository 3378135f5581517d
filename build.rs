use clap::CommandFactory;
use clap_complete::{Shell, generate_to};

// Brings in `Cli` along with its `PathBuf` import
include!("src/cli.rs");

fn main() -> std::io::Result<()> {
    println!("cargo:rerun-if-changed=src/cli.rs");

    let out_dir = match std::env::var_os("OUT_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => return Ok(()),
    };

    let mut command = Cli::command();

    let man = clap_mangen::Man::new(command.clone());
    let mut buffer = Vec::new();
    man.render(&mut buffer)?;
    std::fs::write(out_dir.join("pydsl.1"), buffer)?;

    for shell in [Shell::Bash, Shell::Zsh, Shell::Fish] {
        generate_to(shell, &mut command, "pydsl", &out_dir)?;
    }

    Ok(())
}
