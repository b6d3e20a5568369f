#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Raw-byte path, including serde_json's UTF-8 validation.
    let _ = serde_json::from_slice::<lobby_client::protocol::ServerMessage>(data);

    if let Ok(s) = std::str::from_utf8(data) {
        let _ = serde_json::from_str::<lobby_client::protocol::ServerMessage>(s);
        let _ = serde_json::from_str::<lobby_client::protocol::RoomsResponse>(s);
    }
});
