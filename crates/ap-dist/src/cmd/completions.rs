use clap::CommandFactory;
use clap_complete::generate;

/// Write completions for `shell` to stdout.
pub fn completions(shell: clap_complete::Shell) {
    let mut cmd = crate::Cli::command();
    generate(shell, &mut cmd, "ap-dist", &mut std::io::stdout());
}
