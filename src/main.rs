use aegis_auth::{
    camera::{CaptureSession, V4lDevice},
    capture::capture_frame,
    common::Config,
    flow::{AuthFlowController, FlowNotifier, FlowState, Navigator},
    service::HttpSubmissionClient,
    storage::FileStore,
    validate::{LoginForm, RegistrationForm},
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "aegis-auth")]
#[command(about = "Aegis Security authentication client")]
struct Cli {
    /// Enable verbose development logging
    #[arg(long, global = true)]
    dev: bool,

    /// Path to the configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with email and password
    Login {
        #[arg(short, long)]
        email: String,
    },
    /// Log in with a face capture from the camera
    FaceLogin,
    /// Register a new account
    Register {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(short, long)]
        email: String,
        #[arg(long)]
        country: String,
        /// Agree to the terms of service and privacy policy
        #[arg(long)]
        agree_terms: bool,
    },
    /// Register a new account with a face capture
    FaceRegister {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(short, long)]
        email: String,
        #[arg(long)]
        country: String,
        #[arg(long)]
        agree_terms: bool,
    },
    /// Capture a test image from the camera
    TestCamera,
}

struct TerminalNotifier;

impl FlowNotifier for TerminalNotifier {
    fn state_changed(&mut self, state: FlowState) {
        tracing::debug!("flow state: {}", state);
    }

    fn success(&mut self, title: &str, message: &str) {
        println!("✅ {title}: {message}");
    }

    fn failure(&mut self, title: &str, message: &str) {
        eprintln!("❌ {title}: {message}");
    }
}

struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn proceed(&mut self, route: &str) {
        println!("→ continuing to {route}");
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    setup_logging(cli.dev);

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => {
            let default_path = PathBuf::from("configs/aegis.toml");
            if default_path.exists() {
                Config::load_from_path(&default_path)?
            } else {
                Config::default()
            }
        }
    };

    // Flow failures are already reported through the notifier; they only
    // decide the exit code here.
    let outcome = match cli.command {
        Commands::Login { email } => {
            let password = rpassword::prompt_password("Password: ")?;
            let mut controller = build_controller(&config)?;
            controller
                .login_with_password(LoginForm { email, password })
                .await
        }
        Commands::FaceLogin => {
            let mut controller = build_controller(&config)?;
            println!("Look at the camera...");
            match controller.begin_face_capture().await {
                Ok(()) => controller.submit_face_login().await,
                Err(err) => Err(err),
            }
        }
        Commands::Register {
            first_name,
            last_name,
            email,
            country,
            agree_terms,
        } => {
            let password = rpassword::prompt_password("Password: ")?;
            let mut controller = build_controller(&config)?;
            controller
                .register(RegistrationForm {
                    first_name,
                    last_name,
                    email,
                    password,
                    country,
                    agree_to_terms: agree_terms,
                })
                .await
        }
        Commands::FaceRegister {
            first_name,
            last_name,
            email,
            country,
            agree_terms,
        } => {
            let password = rpassword::prompt_password("Password: ")?;
            let mut controller = build_controller(&config)?;
            println!("Look at the camera...");
            match controller.begin_face_capture().await {
                Ok(()) => {
                    controller
                        .register_with_face(RegistrationForm {
                            first_name,
                            last_name,
                            email,
                            password,
                            country,
                            agree_to_terms: agree_terms,
                        })
                        .await
                }
                Err(err) => Err(err),
            }
        }
        Commands::TestCamera => {
            println!("Testing camera...");
            let mut session =
                CaptureSession::new(Box::new(V4lDevice::new(config.camera.clone())));
            session.open()?;
            let frame = capture_frame(&mut session, config.camera.jpeg_quality).await;
            session.close();

            let frame = frame?;
            let save_path = PathBuf::from("test_capture.jpg");
            std::fs::write(&save_path, &frame.bytes)?;
            println!(
                "Saved {}x{} test image to {:?}",
                frame.width, frame.height, save_path
            );
            Ok(())
        }
    };

    Ok(if outcome.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn build_controller(config: &Config) -> Result<AuthFlowController<HttpSubmissionClient>> {
    let client = HttpSubmissionClient::new(&config.service)?;
    let store = FileStore::new(&config.storage)?;
    let camera = config.camera.clone();

    Ok(AuthFlowController::new(
        client,
        Box::new(move || Box::new(V4lDevice::new(camera.clone()))),
        Box::new(store),
        Box::new(TerminalNotifier),
        Box::new(TerminalNavigator),
        config.camera.jpeg_quality,
    ))
}

fn setup_logging(dev_mode: bool) {
    if dev_mode {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }
}
