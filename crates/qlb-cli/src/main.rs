// crates/qlb-cli/src/main.rs

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};

use qlb_core::{
    CidCodec, CidMethod, ConnectionId, LbCidContext, LbConfig, QuicHost, SERVER_ID_UNKNOWN,
};

#[derive(Parser)]
#[command(name = "qlb", version, about = "QUIC-LB connection ID tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a configuration string and print the resolved fields
    Validate {
        config: String,
    },

    /// Generate CIDs under a configuration and show the recovered server ID
    Mint {
        config: String,
        #[arg(long, default_value_t = 1)]
        count: u32,
    },

    /// Recover the server ID from an observed CID (hex)
    Decode {
        config: String,
        cid: String,
    },
}

fn parse_config(txt: &str) -> Result<LbConfig> {
    txt.parse::<LbConfig>()
        .with_context(|| format!("cannot parse configuration {txt:?}"))
}

/// Commands that mint or decode need a concrete CID length; "inherit from
/// the host" only makes sense inside a full QUIC stack.
fn explicit_length(config: &LbConfig) -> Result<u8> {
    if config.cid_length == 0 {
        Err(anyhow!(
            "configuration leaves the CID length to the host; add an explicit length"
        ))
    } else {
        Ok(config.cid_length)
    }
}

fn method_name(method: &CidMethod) -> &'static str {
    match method {
        CidMethod::Clear => "clear",
        CidMethod::StreamCipher { .. } => "stream cipher",
        CidMethod::BlockCipher { .. } => "block cipher",
    }
}

fn cmd_validate(config: &str) -> Result<()> {
    let cfg = parse_config(config)?;
    println!("method:          {}", method_name(&cfg.method));
    println!("rotation bits:   {}", cfg.rotation_bits);
    println!(
        "first octet:     {}",
        if cfg.first_byte_encodes_length {
            "rotation + encoded length"
        } else {
            "rotation + caller bits"
        }
    );
    if cfg.cid_length == 0 {
        println!("cid length:      inherited from host");
    } else {
        println!("cid length:      {}", cfg.cid_length);
    }
    if let CidMethod::StreamCipher { nonce_length, .. } = &cfg.method {
        println!("nonce length:    {nonce_length}");
    }
    println!(
        "server id:       0x{:x} ({} octets)",
        cfg.server_id.value(),
        cfg.server_id.len()
    );
    println!("canonical:       {cfg}");
    Ok(())
}

fn cmd_mint(config: &str, count: u32) -> Result<()> {
    let cfg = parse_config(config)?;
    let mut host = QuicHost::new(explicit_length(&cfg)?);
    host.install_lb_codec(&cfg)?;
    let none = ConnectionId::zeroed(0);
    for _ in 0..count {
        let cid = host.mint_cid(&none, &none);
        println!("{cid}  server_id=0x{:x}", host.verify_cid(&cid));
    }
    Ok(())
}

fn cmd_decode(config: &str, cid_hex: &str) -> Result<()> {
    let cfg = parse_config(config)?;
    let ctx = LbCidContext::new(&cfg, explicit_length(&cfg)?)?;
    let bytes = hex::decode(cid_hex).context("CID must be hex")?;
    let cid = ConnectionId::from_slice(&bytes)
        .ok_or_else(|| anyhow!("CID longer than the QUIC maximum of 20 octets"))?;
    match ctx.verify(&cid) {
        SERVER_ID_UNKNOWN => println!("unknown CID format (length mismatch?)"),
        id => println!("server_id=0x{id:x}"),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Validate { config } => cmd_validate(&config),
        Commands::Mint { config, count } => cmd_mint(&config, count),
        Commands::Decode { config, cid } => cmd_decode(&config, &cid),
    }
}
