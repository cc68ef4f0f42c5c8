#![no_main]
use libfuzzer_sys::fuzz_target;

use qlb_core::{ConnectionId, LbCidContext, LbConfig};

fuzz_target!(|data: &[u8]| {
    // The goal here is "no panics" under any input: the parser is fed
    // attacker-controlled text, and any config it accepts must survive a
    // build + verify pass.
    let Ok(txt) = core::str::from_utf8(data) else {
        return;
    };
    let Ok(config) = txt.parse::<LbConfig>() else {
        return;
    };

    let cid_length = if config.cid_length == 0 { 20 } else { config.cid_length };
    if let Ok(ctx) = LbCidContext::new(&config, cid_length) {
        use qlb_core::CidCodec;
        let none = ConnectionId::zeroed(0);
        let mut cid = ConnectionId::zeroed(usize::from(cid_length));
        ctx.generate(&none, &none, &mut cid);
        assert_eq!(ctx.verify(&cid), config.server_id.value());
    }
});
