use mlisp::cmdline;

fn main() {
    pretty_env_logger::init();
    let args = std::env::args().collect();
    if let Err(e) = cmdline::launch(args) {
        eprintln!("{}", cmdline::report(&e));
        std::process::exit(1);
    }
}
