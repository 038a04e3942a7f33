use anyhow::Context;
use clap::Parser;
use console::{style, Key, Term};
use gravity_link::{
    AscendInput, ClientCommand, ClientNode, GravityEffect, LinkConfig, Notice, ParticipantId, ServerCommand,
    SessionExt, StepResult,
};
use std::path::PathBuf;

/// z_gravity - Gravity entanglement over Zenoh
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Participant id of the local client (0-255)
    #[arg(short, long, required_unless_present = "server")]
    id: Option<ParticipantId>,

    /// Run the authoritative server instead of a client
    #[arg(short, long)]
    server: bool,

    /// Key expression prefix
    #[arg(short, long)]
    prefix: Option<String>,

    /// Path to Zenoh config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to a JSON link configuration
    #[arg(short, long)]
    link_config: Option<PathBuf>,

    /// Enable the damage-triggered toggle
    #[arg(long)]
    pain_flip: bool,

    /// Enable the jump-triggered toggle
    #[arg(long)]
    gravity_jump: bool,
}

#[tokio::main(flavor = "multi_thread", worker_threads = 1)]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let mut link_config = match &args.link_config {
        Some(path) => LinkConfig::from_json_file(path)
            .with_context(|| format!("Failed to load link config '{}'", path.display()))?,
        None => LinkConfig::default(),
    };
    if let Some(prefix) = &args.prefix {
        link_config = link_config.with_keyexpr_prefix(prefix.clone());
    }
    if args.pain_flip {
        link_config = link_config.with_pain_flip(true);
    }
    if args.gravity_jump {
        link_config = link_config.with_gravity_jump(true);
    }

    // Create zenoh config
    let zenoh_config = match &args.config {
        Some(config_path) => zenoh::Config::from_file(config_path)
            .map_err(|e| anyhow::anyhow!("Failed to load config file: {}", e))?,
        None => zenoh::Config::default(),
    };

    // Create zenoh session
    let session = zenoh::open(zenoh_config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open zenoh session: {}", e))?;

    match args.id {
        Some(id) if !args.server => run_client(&session, id, link_config).await,
        _ => run_server(&session, link_config).await,
    }
}

async fn run_server(session: &zenoh::Session, config: LinkConfig) -> anyhow::Result<()> {
    let prefix = config.keyexpr_prefix.clone();
    let mut node = session.declare_link_server().config(config).await?;

    println!("=== z_gravity - server ===");
    println!("Prefix: {}", prefix);
    println!("Press q to quit");
    println!();

    let sender = node.sender();
    let keyboard_task = tokio::task::spawn_blocking(move || {
        let input_term = Term::stdout();
        while let Ok(key) = input_term.read_key() {
            if matches!(key, Key::Char('q') | Key::Char('Q')) {
                let _ = sender.send(ServerCommand::Stop);
                break;
            }
        }
    });

    loop {
        match node.step().await? {
            StepResult::Stop => break,
            StepResult::Timeout | StepResult::Notices(_) => {
                let registry = node.authority().registry();
                let pairs: Vec<String> = registry
                    .active_ids()
                    .filter_map(|id| registry.partner_of(id).filter(|partner| id < *partner).map(|p| (id, p)))
                    .map(|(a, b)| format!("{}<->{}", a, b))
                    .collect();
                println!(
                    "Participants: {}, pairs: [{}], {}",
                    registry.active_count(),
                    pairs.join(", "),
                    node.stats()
                );
            }
        }
    }

    keyboard_task.abort();
    let _ = keyboard_task.await;
    println!("Server stopped");
    Ok(())
}

async fn run_client(session: &zenoh::Session, id: ParticipantId, config: LinkConfig) -> anyhow::Result<()> {
    let theme = config.theme.clone();
    let mut node = session.declare_link_client(id).config(config).await?;

    println!("=== z_gravity - participant {} ===", id);
    println!("Controls:");
    println!("  w - Ascend (toggle gravity)");
    println!("  h - Take damage");
    println!("  j - Jump");
    println!("  r - Respawn");
    println!("  q - Quit");
    println!();

    let sender = node.sender();
    let keyboard_task = tokio::task::spawn_blocking(move || {
        let input_term = Term::stdout();
        while let Ok(key) = input_term.read_key() {
            let commands = match key {
                // A key press is a full press/release edge for the ascend trigger
                Key::Char('w') | Key::Char('W') => vec![
                    ClientCommand::Ascend(AscendInput {
                        pressed: true,
                        climbing: false,
                    }),
                    ClientCommand::Ascend(AscendInput::default()),
                ],
                Key::Char('h') | Key::Char('H') => vec![ClientCommand::Hurt],
                Key::Char('j') | Key::Char('J') => vec![ClientCommand::Jump],
                Key::Char('r') | Key::Char('R') => vec![ClientCommand::Respawn],
                Key::Char('q') | Key::Char('Q') => {
                    let _ = sender.send(ClientCommand::Stop);
                    break;
                }
                _ => Vec::new(),
            };
            if commands.into_iter().any(|command| sender.send(command).is_err()) {
                break;
            }
        }
    });

    let render_term = Term::stdout();
    loop {
        match node.step().await? {
            StepResult::Stop => break,
            StepResult::Notices(notices) => {
                for notice in notices {
                    tracing::debug!("Chat: {}", notice.render(&theme));
                    print_notice(&render_term, &notice)?;
                }
                print_status(&render_term, &node)?;
            }
            StepResult::Timeout => print_status(&render_term, &node)?,
        }
    }

    keyboard_task.abort();
    let _ = keyboard_task.await;
    println!("Disconnected");
    Ok(())
}

fn print_notice(term: &Term, notice: &Notice) -> anyhow::Result<()> {
    let line = match notice {
        Notice::PrepareForDesync | Notice::Decoherence => style(notice.text()).red().bold(),
        _ => style(notice.text()).cyan(),
    };
    term.write_line(&line.to_string())?;
    Ok(())
}

fn print_status(term: &Term, node: &ClientNode) -> anyhow::Result<()> {
    let peer = node.peer();
    let effect = node.gravity(node.id()).unwrap_or_default();
    let partner = match peer.partner() {
        Some(partner) => format!("entangled with {}", partner),
        None => "unentangled".to_string(),
    };
    let gravity = if effect == GravityEffect::FLIPPED {
        style("flipped").magenta()
    } else {
        style("normal").green()
    };
    term.write_line(&format!("[{}] {}, gravity {}", node.id(), partner, gravity))?;
    term.flush()?;
    Ok(())
}
