fn main() {
    if let Err(err) = txn_enrich::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
