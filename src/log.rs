// Bracketed-tag logging (`[init]`, `[p2p]`, `[rpc]`) with `colored` for the
// tag itself. No external log sink is wired up; this module is the minimal
// "something writes these lines."

use colored::*;

pub fn info(tag: &str, msg: &str) {
    println!("{} {}", format!("[{tag}]").bright_blue().bold(), msg);
}

pub fn warn(tag: &str, msg: &str) {
    println!("{} {}", format!("[{tag}]").yellow().bold(), msg);
}

pub fn error(tag: &str, msg: &str) {
    eprintln!("{} {}", format!("[{tag}]").bright_red().bold(), msg);
}
