fn main() {
    if let Err(e) = gnmilite::run_cli() {
        eprintln!("{e:?}");
        std::process::exit(1);
    }
}
