//! CLI for gemedit - image editing with Gemini.

use clap::{Args, Parser, Subcommand, ValueEnum};
use gemedit::credential::{CredentialSource, CREDENTIAL_ENV_VARS};
use gemedit::prompts::{self, READY_PROMPTS};
use gemedit::{
    CredentialState, EditSession, ErrorKind, GeminiEditor, GeminiModel, HelperCommandHost,
    HostNegotiated, InjectedCredential, KeyPrompt, LocalStore, PersistedCredential, UploadedImage,
};
use std::io::{BufRead, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gemedit")]
#[command(about = "Edit images with natural-language instructions via Gemini")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Edit one image and save the result
    Edit(EditArgs),

    /// Interactive editing session
    Shell(SourceArgs),

    /// List the ready-made instructions
    Prompts,

    /// Manage the stored API key
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
}

#[derive(Subcommand)]
enum KeyAction {
    /// Store a key (prompts when not given)
    Set {
        /// The key to store
        key: Option<String>,
    },
    /// Forget the stored key
    Clear,
    /// Show whether a key is stored
    Status,
}

#[derive(Args)]
struct EditArgs {
    /// Image to edit (PNG, JPEG or WEBP)
    #[arg(short, long)]
    input: PathBuf,

    /// Edit instruction
    #[arg(short, long, conflicts_with = "preset", required_unless_present = "preset")]
    prompt: Option<String>,

    /// Use a ready-made instruction by number (see `gemedit prompts`)
    #[arg(long)]
    preset: Option<usize>,

    /// Output file path
    #[arg(short, long)]
    output: PathBuf,

    #[command(flatten)]
    source: SourceArgs,
}

#[derive(Args, Clone)]
struct SourceArgs {
    /// Where the API key comes from
    #[arg(long, value_enum, default_value = "env")]
    credential: CredentialArg,

    /// Key manager program for `--credential helper`
    #[arg(long, default_value = "gemedit-key-helper")]
    helper: PathBuf,

    /// Model id (defaults to GEMEDIT_MODEL or gemini-2.5-flash-image)
    #[arg(short, long)]
    model: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CredentialArg {
    /// GEMINI_API_KEY / GOOGLE_API_KEY / API_KEY
    Env,
    /// Prompt once and keep the key in the local store
    Stored,
    /// Ask an external key manager
    Helper,
}

/// Reads a pasted key from the terminal.
struct StdinPrompt;

impl KeyPrompt for StdinPrompt {
    fn prompt_for_key(&self) -> std::io::Result<Option<String>> {
        eprint!("Paste your Gemini API key (empty to cancel): ");
        std::io::stderr().flush()?;
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let key = line.trim();
        Ok((!key.is_empty()).then(|| key.to_string()))
    }
}

type Session = EditSession<GeminiEditor, Box<dyn CredentialSource>>;

fn credential_source(args: &SourceArgs) -> anyhow::Result<Box<dyn CredentialSource>> {
    Ok(match args.credential {
        CredentialArg::Env => Box::new(InjectedCredential::from_env()),
        CredentialArg::Stored => Box::new(PersistedCredential::new(
            LocalStore::open_default()?,
            StdinPrompt,
        )),
        CredentialArg::Helper => Box::new(HostNegotiated::new(HelperCommandHost::new(
            args.helper.clone(),
        ))),
    })
}

fn build_session(args: &SourceArgs) -> anyhow::Result<Session> {
    let mut builder = GeminiEditor::builder();
    if let Some(ref model) = args.model {
        builder = builder.model(GeminiModel::parse(model));
    }
    let editor = builder.build()?;
    Ok(EditSession::new(editor, credential_source(args)?)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Edit(args) => edit(args, cli.json).await?,
        Commands::Shell(args) => shell(args).await?,
        Commands::Prompts => list_prompts(cli.json)?,
        Commands::Key { action } => key(action, cli.json)?,
    }

    Ok(())
}

async fn edit(args: EditArgs, json_output: bool) -> anyhow::Result<()> {
    let instruction = match (args.prompt, args.preset) {
        (Some(prompt), _) => prompt,
        (None, Some(n)) => prompts::preset(n)
            .ok_or_else(|| anyhow::anyhow!("no preset #{n} (1-{})", READY_PROMPTS.len()))?
            .to_string(),
        (None, None) => anyhow::bail!("either --prompt or --preset is required"),
    };

    let upload = UploadedImage::from_path(&args.input)?;
    let mut session = build_session(&args.source)?;
    session.upload(vec![upload])?;
    session.set_instruction(instruction);

    let image = match session.submit().await {
        Ok(image) => image.clone(),
        Err(e) if e.kind() == ErrorKind::InvalidCredential => {
            anyhow::bail!("{} ({e})", gemedit::session::INVALID_KEY_MESSAGE)
        }
        Err(e) => return Err(e.into()),
    };
    session.close()?;

    image.save(&args.output)?;

    if json_output {
        let result = serde_json::json!({
            "success": true,
            "input": args.input.display().to_string(),
            "output": args.output.display().to_string(),
            "size_bytes": image.size(),
            "mime_type": image.mime_type,
            "model": image.model,
            "duration_ms": image.duration.as_millis() as u64,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "Edited image: {} ({} bytes, {}) via {}",
            args.output.display(),
            image.size(),
            image.mime_type,
            image.model
        );
        println!("Duration: {}ms", image.duration.as_millis());
    }

    Ok(())
}

fn list_prompts(json_output: bool) -> anyhow::Result<()> {
    if json_output {
        println!("{}", serde_json::to_string_pretty(READY_PROMPTS)?);
    } else {
        println!("Quick ideas:\n");
        for (i, prompt) in READY_PROMPTS.iter().enumerate() {
            println!("  {:>2}. {}", i + 1, prompt);
        }
    }
    Ok(())
}

fn key(action: KeyAction, json_output: bool) -> anyhow::Result<()> {
    let source = PersistedCredential::new(LocalStore::open_default()?, StdinPrompt);

    match action {
        KeyAction::Set { key } => {
            let key = match key {
                Some(key) => key,
                None => StdinPrompt
                    .prompt_for_key()?
                    .ok_or_else(|| anyhow::anyhow!("no key entered"))?,
            };
            source.remember(&key)?;
            println!("Stored API key in {}", source.store().path().display());
        }
        KeyAction::Clear => {
            if source.forget()? {
                println!("Removed stored API key");
            } else {
                println!("No API key stored");
            }
        }
        KeyAction::Status => {
            let stored = source.stored()?.is_some();
            let env = CREDENTIAL_ENV_VARS
                .iter()
                .find(|name| std::env::var(name).is_ok_and(|v| !v.trim().is_empty()));
            if json_output {
                let status = serde_json::json!({
                    "stored": stored,
                    "store_path": source.store().path().display().to_string(),
                    "env_var": env,
                });
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                let mark = |ok: bool| if ok { "✓" } else { "✗" };
                println!(
                    "  {} stored key ({})",
                    mark(stored),
                    source.store().path().display()
                );
                match env {
                    Some(name) => println!("  {} environment ({name})", mark(true)),
                    None => println!(
                        "  {} environment (set one of {})",
                        mark(false),
                        CREDENTIAL_ENV_VARS.join(", ")
                    ),
                }
            }
        }
    }
    Ok(())
}

const SHELL_HELP: &str = "\
Commands:
  upload <path>...    add images to the gallery (selects the first new one)
  replace <path>...   clear the gallery, then upload
  gallery             list uploaded images
  select <n>          make image n active
  remove <n>          remove image n
  presets             list ready-made instructions
  preset <n>          use ready-made instruction n
  prompt <text>       set the instruction
  generate            edit the active image
  save <path>         save the edited image
  status              show the current state
  help                show this help
  quit                leave the shell";

async fn shell(args: SourceArgs) -> anyhow::Result<()> {
    let mut session = build_session(&args)?;

    eprintln!("Checking for API key ({})...", session.credentials().describe());
    if session.connect().await == CredentialState::Missing {
        eprintln!(
            "API key required: {}",
            session.error().unwrap_or("no key available")
        );
    }
    println!("{SHELL_HELP}");

    let stdin = std::io::stdin();
    loop {
        print!("gemedit> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        let (command, rest) = line
            .split_once(char::is_whitespace)
            .map(|(c, r)| (c, r.trim()))
            .unwrap_or((line, ""));

        match command {
            "" => {}
            "quit" | "exit" => break,
            "help" => println!("{SHELL_HELP}"),
            "upload" | "replace" => {
                let mut batch = Vec::new();
                for path in rest.split_whitespace() {
                    match UploadedImage::from_path(path) {
                        Ok(image) => batch.push(image),
                        Err(e) => eprintln!("Error: {path}: {e}"),
                    }
                }
                let result = if command == "upload" {
                    session.upload(batch)
                } else {
                    session.replace(batch)
                };
                match result {
                    Ok(n) => println!("Added {n} image(s)"),
                    Err(e) => eprintln!("Error: {e}"),
                }
            }
            "gallery" => print_gallery(&session),
            "select" => match parse_index(rest) {
                Some(i) => match session.select(i) {
                    Ok(()) => print_gallery(&session),
                    Err(e) => eprintln!("Error: {e}"),
                },
                None => eprintln!("usage: select <n>"),
            },
            "remove" => match parse_index(rest) {
                Some(i) => match session.gallery_mut().remove(i) {
                    Ok(image) => println!("Removed {}", image.name),
                    Err(e) => eprintln!("Error: {e}"),
                },
                None => eprintln!("usage: remove <n>"),
            },
            "presets" => list_prompts(false)?,
            "preset" => match rest.parse().ok().and_then(prompts::preset) {
                Some(p) => {
                    if session.apply_preset(p) {
                        println!("Instruction: {p}");
                    } else {
                        eprintln!("Select an image first");
                    }
                }
                None => eprintln!("usage: preset <1-{}>", READY_PROMPTS.len()),
            },
            "prompt" => {
                session.set_instruction(rest);
                println!("Instruction: {rest}");
            }
            "generate" => {
                println!("Generating...");
                match session.submit().await {
                    Ok(image) => println!(
                        "Edited image ready: {} bytes, {} ({} chars as data URI). Use `save <path>`.",
                        image.size(),
                        image.mime_type,
                        image.data_uri().len()
                    ),
                    Err(_) => {
                        let message = session.error().unwrap_or("An unknown error occurred.");
                        eprintln!("Error: {message}");
                        if session.credential_state() == CredentialState::Missing {
                            eprintln!("A new API key will be requested on the next `generate`.");
                        }
                    }
                }
            }
            "save" => match session.gallery().result() {
                Some(image) if !rest.is_empty() => match image.save(rest) {
                    Ok(()) => println!("Saved {rest}"),
                    Err(e) => eprintln!("Error: {e}"),
                },
                Some(_) => eprintln!("usage: save <path>"),
                None => eprintln!("Nothing to save yet"),
            },
            "status" => print_status(&session),
            other => eprintln!("Unknown command `{other}`; type `help`"),
        }
    }

    let released = session.close()?;
    tracing::debug!(released, "released preview files");
    Ok(())
}

fn parse_index(arg: &str) -> Option<usize> {
    arg.parse::<usize>().ok()?.checked_sub(1)
}

fn print_gallery(session: &Session) {
    let gallery = session.gallery();
    if gallery.is_empty() {
        println!("Upload an image to get started");
        return;
    }
    for (i, entry) in gallery.entries().iter().enumerate() {
        let mark = if gallery.selected_index() == Some(i) { "*" } else { " " };
        println!(
            " {mark} {:>2}. {} ({}, {} bytes) {}",
            i + 1,
            entry.image.name,
            entry.image.mime_type(),
            entry.image.size(),
            entry.handle.uri()
        );
    }
}

fn print_status(session: &Session) {
    let gallery = session.gallery();
    println!("Model:       {}", gemedit::ImageEditor::model(session.editor()));
    println!("API key:     {:?} ({})", session.credential_state(), session.credentials().describe());
    match gallery.selected() {
        Some(entry) => println!("Original:    {} {}", entry.image.name, entry.handle.uri()),
        None if gallery.is_empty() => println!("Original:    Upload an image to get started"),
        None => println!("Original:    Select an image from your gallery"),
    }
    let instruction = gallery.instruction();
    println!(
        "Instruction: {}",
        if instruction.is_empty() { "(none)" } else { instruction }
    );
    match gallery.result() {
        Some(image) => println!("Edited:      {} bytes, {}", image.size(), image.mime_type),
        None => println!("Edited:      Your edited image will appear here"),
    }
    if let Some(error) = session.error() {
        println!("Error:       {error}");
    }
}
