use anyhow::{anyhow, Context, Result};
use clap::ArgMatches;
use log::{error, info, warn};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::modbus::crc::crc16_modbus;
use crate::modbus::{frame, ModbusMaster};
use crate::output::{formatter_for, ConsoleSender, DataFormatter, DataSender, FileSender, RegisterReading};
use crate::transport::SerialTransport;
use crate::utils::error::ModbusError;

/// Formatter plus the destinations each formatted read goes to.
pub struct OutputSink {
    formatter: Box<dyn DataFormatter>,
    senders: Vec<Box<dyn DataSender>>,
}

impl OutputSink {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let format = matches.get_one::<String>("format").map(String::as_str).unwrap_or("console");
        let formatter = formatter_for(format).ok_or_else(|| anyhow!("unknown output format '{}'", format))?;

        let mut senders: Vec<Box<dyn DataSender>> = vec![Box::new(ConsoleSender)];
        if let Some(output_file) = matches.get_one::<String>("output-file") {
            info!("📝 Adding file output: {}", output_file);
            senders.push(Box::new(FileSender::new(output_file)));
        }
        Ok(Self { formatter, senders })
    }

    /// Sends the formatter's header, if it has one.
    pub async fn emit_header(&self) -> Result<()> {
        let header = self.formatter.format_header();
        if header.is_empty() {
            return Ok(());
        }
        self.deliver(header.trim_end()).await
    }

    pub async fn emit(&self, reading: &RegisterReading) -> Result<()> {
        let text = self.formatter.format_reading(reading);
        self.deliver(&text).await
    }

    async fn deliver(&self, text: &str) -> Result<()> {
        for sender in &self.senders {
            if let Err(e) = sender.send(text).await {
                error!("❌ {} output to {} failed: {}", sender.sender_type(), sender.destination(), e);
            }
        }
        Ok(())
    }
}

pub fn open_master(config: &Config) -> Result<ModbusMaster<SerialTransport>, ModbusError> {
    let transport = SerialTransport::open(&config.serial)?;
    let options = config.master_receive_options();
    let mut master = ModbusMaster::new(config.master.slave_address, transport);
    master.set_timeout(options.timeout);
    master.set_poll_interval(options.poll_interval);
    master.set_inter_frame_gap(options.inter_frame_gap);
    Ok(master)
}

/// Runs one blocking master operation on the blocking thread pool.
async fn with_master<F, R>(config: &Config, op: F) -> Result<R>
where
    F: FnOnce(&mut ModbusMaster<SerialTransport>) -> Result<R, ModbusError> + Send + 'static,
    R: Send + 'static,
{
    let config = config.clone();
    let result = tokio::task::spawn_blocking(move || {
        let mut master = open_master(&config)?;
        op(&mut master)
    })
    .await??;
    Ok(result)
}

fn arg<T>(matches: &ArgMatches, name: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = matches
        .get_one::<String>(name)
        .ok_or_else(|| anyhow!("missing argument '{}'", name))?;
    raw.parse::<T>()
        .with_context(|| format!("invalid value '{}' for '{}'", raw, name))
}

pub fn parse_values(raw: &str) -> Result<Vec<u16>> {
    raw.split(',')
        .map(|s| {
            let s = s.trim();
            match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u16::from_str_radix(hex, 16),
                None => s.parse::<u16>(),
            }
            .with_context(|| format!("invalid register value '{}'", s))
        })
        .collect()
}

pub fn parse_hex_bytes<'a, I>(parts: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = &'a str>,
{
    let joined: String = parts
        .into_iter()
        .flat_map(|p| p.chars())
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    hex::decode(&joined).with_context(|| format!("'{}' is not valid hex", joined))
}

pub async fn handle_subcommands(matches: &ArgMatches, config: Config) -> Result<()> {
    let slave = config.master.slave_address;

    match matches.subcommand() {
        Some(("read", sub)) => {
            let start: u16 = arg(sub, "start")?;
            let quantity: u16 = arg(sub, "quantity")?;
            info!("🔍 Reading {} registers from slave {} at {}", quantity, slave, start);

            let values = with_master(&config, move |m| m.read_holding_registers(start, quantity)).await?;
            let sink = OutputSink::from_matches(matches)?;
            sink.emit(&RegisterReading::new(slave, start, values)).await?;
        }
        Some(("write", sub)) => {
            let address: u16 = arg(sub, "address")?;
            let value = parse_values(&arg::<String>(sub, "value")?)?
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("missing value"))?;

            with_master(&config, move |m| m.write_single_register(address, value)).await?;
            println!("✅ Wrote {} to register {} on slave {}", value, address, slave);
        }
        Some(("write-multiple", sub)) => {
            let start: u16 = arg(sub, "start")?;
            let values = parse_values(&arg::<String>(sub, "values")?)?;
            let count = values.len();

            with_master(&config, move |m| m.write_multiple_registers(start, &values)).await?;
            println!("✅ Wrote {} registers at {} on slave {}", count, start, slave);
        }
        Some(("send-string", sub)) => {
            let start: u16 = arg(sub, "start")?;
            let text: String = arg(sub, "text")?;

            with_master(&config, move |m| m.send_string(start, &text)).await?;
            println!("✅ String written at register {} on slave {}", start, slave);
        }
        Some(("transfer-string", sub)) => {
            let start: u16 = arg(sub, "start")?;
            let text: String = arg(sub, "text")?;

            with_master(&config, move |m| m.transfer_string(start, &text)).await?;
            println!("✅ String transferred to register {} on slave {}", start, slave);
        }
        Some(("poll", sub)) => {
            let start: u16 = arg(sub, "start")?;
            let quantity: u16 = arg(sub, "quantity")?;
            let interval: u64 = arg(sub, "interval")?;
            let sink = OutputSink::from_matches(matches)?;
            poll_registers(&config, &sink, start, quantity, Duration::from_secs(interval.max(1))).await?;
        }
        Some(("serve", _)) => {
            serve_slave(&config).await?;
        }
        Some(("crc", sub)) => {
            let parts = sub
                .get_many::<String>("bytes")
                .ok_or_else(|| anyhow!("missing bytes"))?
                .map(String::as_str);
            let bytes = parse_hex_bytes(parts)?;
            let crc = crc16_modbus(&bytes);
            println!("CRC: 0x{:04X} (low 0x{:02X}, high 0x{:02X})", crc, crc & 0xFF, crc >> 8);
            if bytes.len() >= 2 {
                let framed = frame::encode(bytes[0], bytes[1], &bytes[2..])?;
                println!("Frame: {}", hex::encode_upper(&framed));
            }
        }
        Some(("init-config", sub)) => {
            let path: String = arg(sub, "path")?;
            Config::default()
                .save_to_file(&path)
                .map_err(|e| anyhow!("failed to write {}: {}", path, e))?;
            println!("✅ Default configuration written to {}", path);
        }
        Some(("ports", _)) => {
            let ports = SerialTransport::available_ports()?;
            if ports.is_empty() {
                println!("   ⚠️  No serial ports found");
            }
            for (index, port) in ports.iter().enumerate() {
                println!("   {}. {}", index + 1, port);
            }
        }
        Some((other, _)) => return Err(anyhow!("unknown subcommand '{}'", other)),
        None => return Err(anyhow!("no subcommand given")),
    }

    Ok(())
}

async fn poll_registers(
    config: &Config,
    sink: &OutputSink,
    start: u16,
    quantity: u16,
    interval: Duration,
) -> Result<()> {
    let slave = config.master.slave_address;
    info!("🔄 Polling slave {} registers {}..{} every {:?}", slave, start, start as u32 + quantity as u32, interval);
    info!("   🛑 Press Ctrl+C to stop");
    sink.emit_header().await?;

    let open_config = config.clone();
    let master = tokio::task::spawn_blocking(move || open_master(&open_config)).await??;

    let stats = poll_until(
        master,
        sink,
        slave,
        start,
        interval,
        tokio::signal::ctrl_c(),
        move |mut master| async move {
            let polled = tokio::task::spawn_blocking(move || {
                let result = master.read_holding_registers(start, quantity);
                (master, result)
            })
            .await?;
            Ok::<_, anyhow::Error>(polled)
        },
    )
    .await?;

    let total_reads = stats.successful + stats.failed;
    if total_reads > 0 {
        let success_rate = (stats.successful as f32 / total_reads as f32) * 100.0;
        println!("📈 Success rate: {:.1}% ({}/{})", success_rate, stats.successful, total_reads);
    }
    Ok(())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct PollStats {
    successful: u32,
    failed: u32,
}

/// Reads on every `interval` tick until `stop` completes. `stop` is polled
/// for the whole loop, so a stop raised while a read is in flight ends the
/// loop before the next read.
async fn poll_until<M, F, Fut, S>(
    mut state: M,
    sink: &OutputSink,
    slave: u8,
    start: u16,
    interval: Duration,
    stop: S,
    mut read_once: F,
) -> Result<PollStats>
where
    F: FnMut(M) -> Fut,
    Fut: Future<Output = Result<(M, Result<Vec<u16>, ModbusError>)>>,
    S: Future,
{
    tokio::pin!(stop);
    let mut interval_timer = tokio::time::interval(interval);
    let mut stats = PollStats::default();

    loop {
        tokio::select! {
            biased;
            _ = &mut stop => {
                info!("🛑 Stopping poll...");
                break;
            }
            _ = interval_timer.tick() => {
                let (next, result) = read_once(state).await?;
                state = next;

                match result {
                    Ok(values) => {
                        stats.successful += 1;
                        sink.emit(&RegisterReading::new(slave, start, values)).await?;
                    }
                    Err(e) => {
                        stats.failed += 1;
                        warn!("📵 Slave {} - read failed: {}", slave, e);
                    }
                }
            }
        }
    }
    Ok(stats)
}

async fn serve_slave(config: &Config) -> Result<()> {
    let mut slave = config.build_slave()?;
    let options = config.slave_receive_options();
    let serial = config.serial.clone();
    let stop = Arc::new(AtomicBool::new(false));

    info!("🏭 Serving as slave {} on {} (Ctrl+C to stop)", slave.address(), serial.port);

    let worker_stop = Arc::clone(&stop);
    let mut worker = tokio::task::spawn_blocking(move || -> Result<_, ModbusError> {
        let mut transport = SerialTransport::open(&serial)?;
        slave.serve(&mut transport, &options, &worker_stop)
    });

    let stats = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Stopping slave...");
            stop.store(true, Ordering::Relaxed);
            worker.await??
        }
        joined = &mut worker => joined??,
    };
    println!("📊 Final Statistics:");
    println!("   📥 Frames received: {}", stats.frames_received);
    println!("   🗑️  Frames discarded: {}", stats.frames_discarded);
    println!("   📤 Responses sent: {}", stats.responses_sent);
    println!("   ⚠️  Exceptions sent: {}", stats.exceptions_sent);
    Ok(())
}
