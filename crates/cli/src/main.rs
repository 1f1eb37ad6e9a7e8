fn main() {
    if let Err(error) = pdf_desktop_cli::run(std::env::args_os()) {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}
