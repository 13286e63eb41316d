use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use duepi_link::frame::{Response, build_frame, checksum};
use duepi_link::proto::parser::parse_command;
use duepi_link::{Command, CommandCode, Register, StoveClient, StoveState};

mod cli;

use cli::{Cli, Cmd, StoveCmd, WatchOpts};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    match args.cmd {
        Cmd::Frame { code } => print_frame(&code),
        Cmd::Probe => {
            let config = args.conn.resolve()?;
            info!(relay = %config.addr(), "checking stove");
            if StoveClient::probe(config).await? {
                println!("stove answered");
                Ok(())
            } else {
                anyhow::bail!("stove did not answer")
            }
        }
        Cmd::Stove(cmd) => {
            let config = args.conn.resolve()?;
            info!(relay = %config.addr(), "using relay");
            let client = StoveClient::new(config)?;
            let result = run(&client, cmd).await;
            client.disconnect().await;
            result
        }
    }
}

async fn run(client: &StoveClient, cmd: StoveCmd) -> Result<()> {
    match cmd {
        StoveCmd::Status { json } => {
            let state = client.read_state().await.context("reading stove state")?;
            print_state(&state, json)?;
        }
        StoveCmd::Read { register } => {
            let reg: Register = register.parse()?;
            let value = client
                .read_register(reg)
                .await
                .with_context(|| format!("reading {reg}"))?;
            if reg.is_status_word() {
                println!("{reg} = 0x{value:08X}");
            } else {
                println!("{reg} = {value}");
            }
        }
        StoveCmd::On => client.power_on().await.context("power on")?,
        StoveCmd::Off => client.power_off().await.context("power off")?,
        StoveCmd::Power { level } => {
            let applied = client.set_power_level(level).await.context("set power")?;
            println!("power level set to {applied}");
        }
        StoveCmd::Temp { celsius } => {
            let applied = client
                .set_target_temperature(celsius)
                .await
                .context("set temperature")?;
            println!("target temperature set to {applied}°C");
        }
        StoveCmd::ResetError => client.reset_error().await.context("reset error")?,
        StoveCmd::Watch(opts) => watch(client, opts).await?,
        StoveCmd::Send { words } => {
            let cmd = parse_command(&words.join(" "))?;
            let response = client
                .execute(cmd)
                .await
                .with_context(|| format!("sending {}", cmd.code()))?;
            print_response(cmd, &response);
        }
    }
    Ok(())
}

async fn watch(client: &StoveClient, opts: WatchOpts) -> Result<()> {
    let mut ticker = tokio::time::interval(opts.period()?);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut polls = 0u64;
    loop {
        ticker.tick().await;
        match client.read_state().await {
            Ok(state) => print_state(&state, opts.json)?,
            // A failed poll is retried on the next tick.
            Err(e) => warn!(error = %e, "poll failed"),
        }
        polls += 1;
        if opts.count.is_some_and(|n| polls >= n) {
            return Ok(());
        }
    }
}

fn print_state(state: &StoveState, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(state)?);
        return Ok(());
    }
    println!(
        "{} ({}) room={:.1}°C target={}°C fumes={}°C power={} pellet={} fan={}rpm",
        state.status_text,
        if state.is_on { "on" } else { "off" },
        state.room_temp,
        state.target_temp,
        state.fumes_temp,
        state.power_level,
        state.pellet_speed,
        state.fan_rpm,
    );
    if state.has_alarm {
        println!("ALARM {}: {}", state.alarm_code, state.alarm_text);
    }
    Ok(())
}

fn print_response(cmd: Command, response: &Response) {
    match cmd {
        Command::Read(reg) if reg.is_status_word() => {
            println!("{response} -> 0x{:08X}", response.status_word())
        }
        Command::Read(_) | Command::Raw(_) => {
            println!("{response} -> {}", response.register_value())
        }
        _ => println!("{response}"),
    }
}

fn print_frame(code: &str) -> Result<()> {
    let code: CommandCode = code.parse()?;
    let frame = build_frame(&code);
    let hex: Vec<String> = frame.iter().map(|b| format!("{b:02X}")).collect();
    println!("code={} sum={:02X}", code, checksum(&code));
    println!("{}", hex.join(" "));
    println!("{}", frame.escape_ascii());
    Ok(())
}
