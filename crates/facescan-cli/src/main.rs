mod config;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use config::Config;
use facescan_client::api::SignupRequest;
use facescan_client::{FaceClient, FileSessionStore, HttpTransport};
use facescan_core::{CaptureController, CaptureEvent, EncodedImage, ImageEncoder, SelectedFile};
use facescan_hw::V4l2Device;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;

#[derive(Parser)]
#[command(name = "facescan", about = "Face registration and recognition client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the session token
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    /// Create an account
    Signup {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
        #[arg(long)]
        phone: Option<String>,
    },
    /// Log out and forget the stored session
    Logout,
    /// List registered faces
    Faces,
    /// Register a face under a name
    Register {
        /// Name to register the face under (2-50 characters)
        #[arg(short, long)]
        name: String,
        #[command(flatten)]
        source: Source,
    },
    /// Recognize a face against the registered set
    Recognize {
        #[command(flatten)]
        source: Source,
    },
    /// List V4L2 capture devices
    Devices,
    /// Grab one camera frame and write it as JPEG (camera diagnostics)
    Snapshot {
        #[arg(short, long)]
        out: PathBuf,
    },
}

/// Where the face image comes from.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct Source {
    /// Image file to upload
    #[arg(long)]
    file: Option<PathBuf>,
    /// Capture from the configured camera
    #[arg(long)]
    camera: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    tracing::debug!(api = %config.api_url, camera = %config.camera_device, "config loaded");

    match cli.command {
        Commands::Login { email, password } => {
            let client = connect(&config)?;
            client.auth.login(&email, &password).await?;
            println!("Logged in as {email}");
        }
        Commands::Signup {
            name,
            email,
            password,
            phone,
        } => {
            let client = connect(&config)?;
            let request = SignupRequest {
                name,
                email,
                password,
                phone,
            };
            client.auth.signup(&request).await?;
            println!("Account created for {}. You can now log in.", request.email);
        }
        Commands::Logout => {
            connect(&config)?.logout().await?;
            println!("Logged out");
        }
        Commands::Faces => {
            let client = connect_authenticated(&config)?;
            let faces = match client.cache.faces().await {
                Ok(faces) => faces,
                Err(e) if e.is_not_found() => Vec::new(),
                Err(e) => return Err(e.into()),
            };
            if faces.is_empty() {
                println!("No faces registered");
            }
            for face in faces {
                let created = format_created(face.created_at, &chrono::Local);
                println!("{:<30} {created}", face.name);
            }
        }
        Commands::Register { name, source } => {
            let client = connect_authenticated(&config)?;
            facescan_client::cache::validate_face_name(&name)?;
            let image = acquire(&config, source.file, true).await?;
            client.cache.register(&name, &image).await?;
            println!("Registered face \"{}\"", name.trim());
        }
        Commands::Recognize { source } => {
            let client = connect_authenticated(&config)?;
            let image = acquire(&config, source.file, true).await?;
            match client.cache.recognize(&image).await {
                Ok(result) => {
                    let level = result.match_level();
                    println!("Match: {}", result.name);
                    println!("Confidence: {:.1}% ({level})", result.match_ratio);
                    if !level.is_reliable() {
                        println!("Low confidence; try better lighting or a clearer image.");
                    }
                }
                Err(e) if e.is_not_found() => {
                    bail!("No faces registered. Register at least one face before recognizing.")
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Devices => {
            let devices = facescan_hw::list_devices();
            if devices.is_empty() {
                println!("No capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
        Commands::Snapshot { out } => {
            let image = acquire(&config, None, false).await?;
            let bytes = image.decode().context("captured image is not valid base64")?;
            tokio::fs::write(&out, &bytes)
                .await
                .with_context(|| format!("writing {}", out.display()))?;
            println!("Wrote {} ({} bytes)", out.display(), bytes.len());
        }
    }

    Ok(())
}

fn connect(config: &Config) -> Result<FaceClient> {
    let transport = HttpTransport::new(&config.api_url, config.request_timeout())
        .context("building HTTP client")?;
    let session = FileSessionStore::open(&config.session_path)
        .with_context(|| format!("opening session {}", config.session_path.display()))?;
    Ok(FaceClient::new(Arc::new(transport), Arc::new(session)))
}

fn connect_authenticated(config: &Config) -> Result<FaceClient> {
    let client = connect(config)?;
    if !client.auth.is_authenticated() {
        bail!("Not logged in. Run `facescan login` first.");
    }
    Ok(client)
}

/// Registration time in the given zone, e.g. `May 01, 2024 10:00 AM`.
fn format_created<Tz>(at: chrono::DateTime<chrono::Utc>, tz: &Tz) -> String
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    at.with_timezone(tz).format("%b %d, %Y %l:%M %p").to_string()
}

/// Produce an upload payload through the capture controller, from `file` if
/// given and from the camera otherwise.
async fn acquire(config: &Config, file: Option<PathBuf>, interactive: bool) -> Result<EncodedImage> {
    let device = V4l2Device::new(&config.camera_device, config.capture_width, config.capture_height)
        .with_warmup_frames(config.warmup_frames);
    let encoder =
        ImageEncoder::new(config.jpeg_quality).with_max_upload_bytes(config.max_upload_bytes);
    let mut controller = CaptureController::new(device, encoder).on_payload_ready(|body| {
        tracing::debug!(bytes = body.len(), "payload ready");
    });

    let events = match file {
        Some(path) => vec![CaptureEvent::SelectFile(SelectedFile::new(path))],
        None => vec![CaptureEvent::StartCamera, CaptureEvent::Capture],
    };
    for event in events {
        if interactive && matches!(event, CaptureEvent::Capture) {
            println!("Camera is on. Face the camera and press Enter to capture.");
            wait_for_enter().await?;
        }
        controller
            .dispatch(event)
            .await
            .map_err(|e| anyhow!(e.user_message()))?;
    }

    controller
        .payload()
        .cloned()
        .ok_or_else(|| anyhow!("No image captured"))
}

async fn wait_for_enter() -> Result<()> {
    let mut line = String::new();
    tokio::io::BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("reading stdin")?;
    Ok(())
}
