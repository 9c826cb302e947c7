fn main() {
    if let Err(e) = ddt_ingest_lib::run() {
        eprintln!("ddt-ingest: {e}");
        std::process::exit(1);
    }
}
