fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if handle_cli_flags(&args) {
        return;
    }

    if let Err(err) = forum_state::run(&args) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn handle_cli_flags(args: &[String]) -> bool {
    let mut saw_flag = false;
    for arg in args {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("forum-state {}", forum_state::VERSION);
                saw_flag = true;
            }
            "--help" | "-h" => {
                print_help();
                saw_flag = true;
            }
            _ => {}
        }
    }
    saw_flag
}

fn print_help() {
    let config_path = forum_state::config::default_path()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "~/.config/forum-state/config.yaml".to_string());
    println!(
        "forum-state: community forum state tools.\n\n  thread <topic.json|topic-id> [--width N]   Print a Discourse topic as a reply tree\n  sort <items.json> [--mode M]               Order content items (highest, lowest, controversial, newest, oldest)\n  crumbs <pathname>                          Print the breadcrumb trail for a route\n  communities                                List communities from the configured backend\n  config                                     Print the effective configuration\n\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message\n\nConfig file: {config_path}"
    );
}
