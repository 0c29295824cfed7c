fn main() {
    let code = dash_cli::run_from_env();
    std::process::exit(code);
}
