//! CLI клиент newsbus
//!
//! Клиент командной строки для сервера новостной ленты: запросы,
//! создание событий, подписки и интерактивный режим (REPL) с сырыми
//! JSON-кадрами.

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use newsbus::{
    client::{ClientConfig, NewsClient, SubscriptionEvent},
    protocol::ServerFrame,
    FeedPayload, NewsEvent, SubscriptionField,
};
use rustyline::{error::ReadlineError, DefaultEditor};
use tracing::debug;

/// Основная структура CLI аргументов
#[derive(Parser)]
#[command(name = "newsbus-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "newsbus CLI - command line client for the newsbus server", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Хост сервера (IP или доменное имя)
    #[arg(
        short = 'H',
        long,
        default_value = "127.0.0.1",
        env = "NEWSBUS_HOST",
        help = "Хост сервера для подключения"
    )]
    host: String,
    /// Порт сервера
    #[arg(
        short,
        long,
        default_value = "4000",
        env = "NEWSBUS_PORT",
        help = "Порт сервера для подключения"
    )]
    port: u16,
    /// Таймаут соединения в секундах
    #[arg(long, default_value = "5", help = "Таймаут соединения в секундах")]
    timeout: u64,
    /// Таймаут чтения данных в секундах
    #[arg(
        long,
        default_value = "30",
        help = "Таймаут ожидания ответа сервера в секундах"
    )]
    read_timeout: u64,
    /// Таймаут записи данных в секундах
    #[arg(
        long,
        default_value = "10",
        help = "Таймаут отправки кадра серверу в секундах"
    )]
    write_timeout: u64,
    /// Включить подробный вывод (debug)
    #[arg(short, long, help = "Включить подробный вывод для отладки")]
    verbose: bool,
    /// Подкоманда для выполнения
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Подкоманды CLI
#[derive(Subcommand)]
enum Commands {
    /// Проверка соединения с сервером
    Ping {
        /// Количество пингов
        #[arg(short = 'c', long, default_value = "1")]
        count: u32,
        /// Интервал между пингами (мс)
        #[arg(short, long, default_value = "1000")]
        interval: u64,
    },
    /// Список всех событий
    Events,
    /// Создать событие
    Create {
        #[arg(short, long)]
        title: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// Подписаться и печатать события до Ctrl-C
    #[command(alias = "sub")]
    Subscribe {
        /// Поля подписки: newsFeed, allEvents
        #[arg(required = true)]
        fields: Vec<String>,
    },
    /// Интерактивный режим (REPL)
    #[command(alias = "i")]
    Interactive {
        /// Путь к файлу истории
        #[arg(long, help = "Файл для сохранения истории (по умолчанию ~/.newsbus_history)")]
        history: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let server_addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .context("Неверный формат адреса сервера")?;
    let config = ClientConfig {
        connect_timeout: Duration::from_secs(cli.timeout),
        read_timeout: Duration::from_secs(cli.read_timeout),
        write_timeout: Duration::from_secs(cli.write_timeout),
    };

    match handle_command(cli.command, server_addr, config).await {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}

/// Обработчик выполнения команд
async fn handle_command(
    command: Option<Commands>,
    addr: SocketAddr,
    config: ClientConfig,
) -> Result<()> {
    let mut client = NewsClient::connect(addr, config).await?;

    match command {
        Some(Commands::Ping { count, interval }) => {
            for i in 0..count {
                let start = std::time::Instant::now();
                client.ping().await?;
                println!("PONG ({:.2} ms)", start.elapsed().as_secs_f64() * 1000.0);
                if i + 1 < count {
                    tokio::time::sleep(Duration::from_millis(interval)).await;
                }
            }
        }
        Some(Commands::Events) => {
            let events = client.events().await?;
            print_events(&events);
        }
        Some(Commands::Create { title, description }) => {
            let event = client.create_news_event(&title, &description).await?;
            println!("created: {}", format_event(&event));
        }
        Some(Commands::Subscribe { fields }) => {
            let fields = fields
                .iter()
                .map(|f| SubscriptionField::from_str(f).with_context(|| format!("unknown field '{f}'")))
                .collect::<Result<Vec<_>>>()?;
            return subscribe(client, &fields).await;
        }
        Some(Commands::Interactive { history }) => {
            return interactive_mode(client, history).await;
        }
        None => return interactive_mode(client, None).await,
    }

    client.close().await?;
    Ok(())
}

/// Инициализация логирования: по умолчанию только ошибки.
fn init_logging(verbose: bool) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if verbose { "debug" } else { "error" };

    fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Ошибка инициализации логирования: {e}"))?;

    Ok(())
}

async fn subscribe(
    mut client: NewsClient,
    fields: &[SubscriptionField],
) -> Result<()> {
    let id = client.subscribe(fields).await?;
    println!("subscribed ({id}), press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                client.complete(&id).await?;
                break;
            }
            event = client.next_event() => match event? {
                SubscriptionEvent::Next { payload, .. } => print_payload(&payload),
                SubscriptionEvent::Complete { id } => {
                    println!("subscription {id} completed by server");
                    break;
                }
            }
        }
    }

    client.close().await?;
    Ok(())
}

/// Интерактивный режим (REPL)
///
/// Строки отправляются серверу как есть; ответы и события подписок
/// печатаются после каждой строки.
async fn interactive_mode(
    mut client: NewsClient,
    history: Option<PathBuf>,
) -> Result<()> {
    println!("newsbus-cli {}", env!("CARGO_PKG_VERSION"));
    println!("connected to {}", client.server_addr());
    println!(r#"type JSON frames, e.g. {{"type":"query","id":"1","field":"events"}}; "quit" exits"#);

    let history = history.or_else(default_history_path);
    let mut editor = DefaultEditor::new()?;
    if let Some(path) = &history {
        // Отсутствие файла истории при первом запуске не ошибка
        let _ = editor.load_history(path);
    }

    loop {
        let line = match tokio::task::block_in_place(|| editor.readline("newsbus> ")) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let line = line.trim();
        if line.is_empty() {
            drain(&mut client).await?;
            continue;
        }
        editor.add_history_entry(line)?;

        if line == "quit" || line == "exit" {
            break;
        }
        if let Err(e) = serde_json::from_str::<serde_json::Value>(line) {
            println!("(error) not a JSON frame: {e}");
            continue;
        }

        client.connection().send_raw(line).await?;
        if !drain(&mut client).await? {
            println!("(connection closed)");
            break;
        }
    }

    if let Some(path) = &history {
        if let Err(e) = editor.save_history(path) {
            debug!("Failed to save history: {e}");
        }
    }
    client.close().await.or_else(|e| match e {
        newsbus::ClientError::ConnectionClosed => Ok(()),
        other => Err(other.into()),
    })
}

/// Печатает кадры, пришедшие за короткое время. `false`, если сервер
/// прислал `bye`.
async fn drain(client: &mut NewsClient) -> Result<bool> {
    while let Some(frame) = client
        .connection()
        .receive_frame_within(Duration::from_millis(300))
        .await?
    {
        println!("{}", serde_json::to_string(&frame)?);
        if matches!(frame, ServerFrame::Bye { .. }) {
            return Ok(false);
        }
    }
    Ok(true)
}

fn default_history_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".newsbus_history"))
}

fn print_payload(payload: &FeedPayload) {
    match payload {
        FeedPayload::NewsFeed(event) => println!("[newsFeed] {}", format_event(event)),
        FeedPayload::AllEvents(events) => {
            println!("[allEvents] {} event(s)", events.len());
            print_events(events);
        }
    }
}

fn print_events(events: &[NewsEvent]) {
    if events.is_empty() {
        println!("(empty)");
    }
    for (i, event) in events.iter().enumerate() {
        println!("{}) {}", i + 1, format_event(event));
    }
}

fn format_event(event: &NewsEvent) -> String {
    if event.description.is_empty() {
        format!("\"{}\"", event.title)
    } else {
        format!("\"{}\" - {}", event.title, event.description)
    }
}
