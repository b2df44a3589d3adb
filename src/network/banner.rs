use std::env;

use atty::Stream;
use chrono::{DateTime, Local};
use owo_colors::OwoColorize;
use sysinfo::System;

use crate::pubsub::ChannelConfig;

/// Полный баннер с информацией о сервере.
pub const ASCII_FULL: &str = r#"
    newsbus {version}
    ----------------------------------------------
    Mode:             {mode}
    Listening:        {listen}
    Queues:           {queues}
    PID:              {pid}
    Host:             {host}
    OS/Arch:          {os}/{arch}
    CPU(s):           {cpus}
    Memory:           {mem_value} {mem_unit}
    Build:            {git} ({build_time})
"#;

/// Компактный баннер для вывода.
pub const ASCII_COMPACT: &str = r#"
newsbus {version} | {mode} | {listen} | PID {pid}
"#;

/// Описание очередей подписчиков для баннера.
pub fn describe_queues(config: &ChannelConfig) -> String {
    match config.capacity {
        Some(capacity) => format!("bounded ({capacity}, {:?})", config.overflow),
        None => "unbounded".to_string(),
    }
}

/// Вывод баннера сервера с информацией о конфигурации
///
/// # Параметры
/// - `listen`: адрес, на котором слушает сервер
/// - `queues`: описание очередей подписчиков, см. [`describe_queues`]
pub fn print_banner(
    listen: &str,
    queues: &str,
) {
    // Определяем режим отображения баннера: полный или компактный
    let forced = env::var("NEWSBUS_BANNER").ok();
    let full = match forced.as_deref() {
        Some("full") => true,
        Some("compact") => false,
        _ => cfg!(debug_assertions), // debug => полный, release => компактный
    };

    let version = env!("CARGO_PKG_VERSION");
    // добавляем разрядность (32/64-bit) к версии
    let bits = std::mem::size_of::<usize>() * 8;
    let version_with_bits = format!("{version} ({bits}-bit)");

    let mode = if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    };
    let pid = std::process::id();
    let color = atty::is(Stream::Stdout);

    if !full {
        let s = ASCII_COMPACT
            .replace("{version}", &version_with_bits)
            .replace("{mode}", mode)
            .replace("{listen}", listen)
            .replace("{pid}", &pid.to_string());

        if color {
            println!("{}", s.bold().green());
        } else {
            println!("{s}");
        }
        println!();
        return;
    }

    let mut sys = System::new();
    sys.refresh_memory();

    let host = System::host_name().unwrap_or_else(|| "unknown".into());
    let cpus = num_cpus::get();

    // Расчет памяти (sysinfo 0.30 отдаёт байты)
    let mem_total_mb = sys.total_memory() as f64 / (1024.0 * 1024.0);
    let (mem_value, mem_unit) = if mem_total_mb >= 1024.0 {
        (mem_total_mb / 1024.0, "GB")
    } else {
        (mem_total_mb, "MB")
    };

    let git = option_env!("GIT_COMMIT").unwrap_or("unknown");
    let build_time = format_build_time(option_env!("BUILD_TIME").unwrap_or("unknown"));

    let s = ASCII_FULL
        .replace("{version}", &version_with_bits)
        .replace("{mode}", mode)
        .replace("{listen}", listen)
        .replace("{queues}", queues)
        .replace("{pid}", &pid.to_string())
        .replace("{host}", &host)
        .replace("{os}", env::consts::OS)
        .replace("{arch}", env::consts::ARCH)
        .replace("{cpus}", &cpus.to_string())
        .replace("{mem_value}", &format!("{mem_value:.1}"))
        .replace("{mem_unit}", mem_unit)
        .replace("{git}", git)
        .replace("{build_time}", &build_time);

    if !color {
        println!("{s}");
        return;
    }

    for (i, line) in s.lines().enumerate() {
        let trimmed = line.trim_start();
        if i == 1 {
            println!("{}", line.bold().bright_blue());
        } else if trimmed.starts_with("Mode:") {
            println!("{}", line.replace(mode, &mode.cyan().to_string()));
        } else if trimmed.starts_with("Listening:") || trimmed.starts_with("PID:") {
            println!("{}", line.magenta());
        } else if trimmed.starts_with("Build:") {
            println!("{}", line.dimmed());
        } else {
            println!("{line}");
        }
    }
    println!();
}

/// Лог запуска сервера с точностью до миллисекунд
pub fn print_startup_log() {
    let pid = std::process::id();
    let ts = Local::now().format("%d %b %Y %H:%M:%S%.3f");

    if atty::is(Stream::Stdout) {
        println!(
            "[{}] {} {} {}",
            pid.to_string().red(),
            ts.to_string().white(),
            "# Server started, newsbus version".dimmed().bold(),
            env!("CARGO_PKG_VERSION").dimmed().bold()
        );
        println!(
            "[{}] {} {}",
            pid.to_string().red(),
            ts.to_string().white(),
            "* Ready to accept connections".green()
        );
    } else {
        println!(
            "[{}] {} # Server started, newsbus version {}",
            pid,
            ts,
            env!("CARGO_PKG_VERSION")
        );
        println!("[{pid}] {ts} * Ready to accept connections");
    }
}

/// RFC 3339 из `build.rs` в локальное время.
fn format_build_time(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt
            .with_timezone(&Local)
            .format("%d.%m.%Y %H:%M:%S")
            .to_string(),
        Err(_) => raw.to_string(),
    }
}
