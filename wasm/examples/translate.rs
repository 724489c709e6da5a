use dubsync_wasm::DubbingSession;
use system::{bincode, ClientCommand};

fn main() {
    let mut session = DubbingSession::new();
    session.create_or_join_room(Some("ABCDE".into()));
    println!("{:?}", session.consume_pending_command());

    session.toggle_pause(12.5);
    let bytes = session.consume_pending_command_bytes().unwrap_or_default();
    let command = bincode::deserialize::<ClientCommand>(&bytes).unwrap();
    println!("{} bytes: {:?}", bytes.len(), command);
    println!("{}", session.consume_directives());
}
