// Run: cargo test -p qlb-core --test codec_roundtrip
//
// Whatever the method, whatever the pre-fill: a minted CID always verifies
// back to the configured server ID.

use qlb_core::{ConnectionId, LbConfig, QuicHost, SERVER_ID_UNKNOWN};

const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f";

fn host_with(txt: &str) -> QuicHost {
    let config: LbConfig = txt.parse().unwrap();
    let mut host = QuicHost::new(0);
    host.install_lb_codec(&config).unwrap();
    host
}

#[test]
fn all_methods_round_trip_random_cids() {
    let configs = [
        ("0N5C-2a".to_string(), 0x2a),
        ("1Y20C-0011223344556677".to_string(), 0x0011_2233_4455_6677),
        (format!("0Y10S8-31-{KEY_HEX}"), 0x31),
        (format!("2N20S12-1234-{KEY_HEX}"), 0x1234),
        (format!("3N20S16-07-{KEY_HEX}"), 0x07),
        (format!("0N17B-aa-{KEY_HEX}"), 0xaa),
        (format!("1Y20B-123456789abcde-{KEY_HEX}"), 0x0012_3456_789a_bcde),
    ];
    let none = ConnectionId::zeroed(0);

    for (txt, server_id) in &configs {
        let host = host_with(txt);
        for _ in 0..64 {
            let cid = host.mint_cid(&none, &none);
            assert_eq!(host.verify_cid(&cid), *server_id, "config {txt}");
        }
    }
}

#[test]
fn rotation_bits_land_in_the_top_two_bits() {
    let none = ConnectionId::zeroed(0);
    for rotation in 0..=3u8 {
        let host = host_with(&format!("{rotation}N17B-aa-{KEY_HEX}"));
        let cid = host.mint_cid(&none, &none);
        assert_eq!(cid.as_slice()[0] >> 6, rotation);
    }
}

#[test]
fn encoded_length_lands_in_the_low_six_bits() {
    let none = ConnectionId::zeroed(0);
    for txt in ["1Y5C-2a", &format!("2Y18S12-1234-{KEY_HEX}")] {
        let host = host_with(txt);
        let cid = host.mint_cid(&none, &none);
        let len = host.local_cid_length();
        assert_eq!(cid.as_slice()[0] & 0x3f, len - 1);
    }
}

#[test]
fn verify_is_total_over_arbitrary_observed_cids() {
    let host = host_with(&format!("0N20S12-1234-{KEY_HEX}"));
    // Wrong lengths: sentinel. Right length: some integer, never a panic.
    for len in 0..=20usize {
        let observed = ConnectionId::zeroed(len);
        let got = host.verify_cid(&observed);
        if len == 20 {
            assert_ne!(got, SERVER_ID_UNKNOWN);
        } else {
            assert_eq!(got, SERVER_ID_UNKNOWN);
        }
    }
}
