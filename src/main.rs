fn main() {
    if let Err(e) = nso_chat::cli::main() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
