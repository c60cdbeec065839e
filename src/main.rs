fn main() {
    #[cfg(feature = "cli")]
    oxiszx::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("oxiszx: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
