fn main() {
    if let Err(err) = omni_insights::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
