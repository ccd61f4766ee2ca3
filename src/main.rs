fn main() {
    if let Err(err) = sheet_onboard::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
