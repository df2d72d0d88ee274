//! Plain terminal rendering for the chat loop.

use chrono::Local;

use crate::tracker::OutboundMessage;

fn stamp() -> String {
    Local::now().format("%H:%M").to_string()
}

pub fn incoming(sender: &str, text: &str) {
    println!("{} {}: {}", stamp(), sender, text);
}

pub fn outgoing(record: &OutboundMessage) {
    println!(
        "{} you: {} [{}]",
        stamp(),
        record.text,
        record.status.as_str()
    );
}

pub fn system(msg: &str) {
    println!("* {msg}");
}

pub fn error(msg: &str) {
    eprintln!("! {msg}");
}
