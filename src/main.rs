fn main() {
    if let Err(err) = sales_sheet::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
