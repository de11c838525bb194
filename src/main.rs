use clap::{Args, Parser, Subcommand};

use accounts::{
    app,
    config::{AppConfig, StoreBackend},
    state::AppState,
    users::{
        manager::UserManager,
        policy::{PasswordPolicy, UserAttributes},
        signup::is_valid_email,
    },
};

#[derive(Parser, Debug)]
#[command(name = "accounts", version, about = "User accounts and signup API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API (default).
    Serve,
    /// Create a user with the staff and admin flags set.
    CreateSuperuser(SuperuserArgs),
}

#[derive(Args, Debug)]
struct SuperuserArgs {
    #[arg(long)]
    email: String,
    #[arg(long)]
    first_name: String,
    #[arg(long)]
    last_name: String,
    /// Falls back to SUPERUSER_PASSWORD.
    #[arg(long)]
    password: Option<String>,
    /// Accept a password the policy rejects.
    #[arg(long)]
    skip_validation: bool,
}

impl SuperuserArgs {
    fn password(&self) -> anyhow::Result<String> {
        self.password
            .clone()
            .or_else(|| std::env::var("SUPERUSER_PASSWORD").ok())
            .ok_or_else(|| anyhow::anyhow!("--password or SUPERUSER_PASSWORD is required"))
    }

    /// Refuses input that would create an unusable or throwaway account.
    fn check(
        &self,
        password: &str,
        store: StoreBackend,
        policy: &PasswordPolicy,
    ) -> anyhow::Result<()> {
        if store == StoreBackend::Memory {
            anyhow::bail!(
                "create-superuser needs a persistent store; set DATABASE_URL or STORE_BACKEND=postgres"
            );
        }
        if !is_valid_email(self.email.trim()) {
            anyhow::bail!("invalid email address: {:?}", self.email);
        }
        if !self.skip_validation {
            let attrs = UserAttributes {
                email: &self.email,
                first_name: &self.first_name,
                last_name: &self.last_name,
            };
            if let Err(violations) = policy.validate(password, &attrs) {
                anyhow::bail!("password rejected: {}", violations.join(" "));
            }
        }
        Ok(())
    }
}

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "accounts=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let state = AppState::init(config).await?;
            let config = state.config.clone();
            app::serve(app::build_app(state), &config).await
        }
        Command::CreateSuperuser(args) => {
            let password = args.password()?;
            let policy = PasswordPolicy::from_config(&config.password_policy)?;
            args.check(&password, config.store, &policy)?;

            let state = AppState::init(config).await?;
            let manager = UserManager::new(state.users.clone());
            let user = manager
                .create_superuser(&args.email, &args.first_name, &args.last_name, &password)
                .await
                .map_err(|e| anyhow::anyhow!("create superuser: {e:?}"))?;
            println!("created superuser {} ({})", user.email, user.id);
            Ok(())
        }
    }
}
