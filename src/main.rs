fn main() {
    if let Err(e) = splicemap::init_logger() {
        eprintln!("Cannot initialize logger: {}", e);
    }
    let args: Vec<_> = std::env::args().collect();
    if let Err(e) = splicemap::command::run(&args) {
        log::error!("{}", e.display());
        std::process::exit(1);
    }
}
