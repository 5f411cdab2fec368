//! One function per subcommand.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, bail};
use applink_core::{
    AuthFlow, CodeService, CredentialStore, DispatcherConfig, FileKeyValueStore, HttpCodeService,
    KeyValueStore, Studio, strip_code_fences,
};
use applink_types::{
    DEFAULT_MODEL, DEFAULT_MODIFY_MODEL, MODEL_CATALOG, ModifyCodeRequest, SaveCodeRequest,
    SignInForm, SignUpForm,
};
use tracing::{debug, info};

use crate::cli::{Cli, SignInArgs, SignUpArgs};
use crate::repl;

/// Service and credential store shared by every command.
pub struct Context {
    pub service: Arc<HttpCodeService>,
    pub credentials: CredentialStore,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let path = cli.credentials_path();
        debug!(path = %path.display(), "credential store");
        let kv: Arc<dyn KeyValueStore> = Arc::new(FileKeyValueStore::new(path));
        let credentials = CredentialStore::new(kv);

        let timeout = cli.timeout.map(Duration::from_secs);
        let mut service = HttpCodeService::with_timeout(&cli.server, timeout)
            .with_context(|| format!("cannot build a client for {}", cli.server))?;
        if let Some(token) = credentials.token()? {
            service = service.with_token(token);
        }
        Ok(Self {
            service: Arc::new(service),
            credentials,
        })
    }

    fn auth(&self) -> AuthFlow<HttpCodeService> {
        AuthFlow::new(self.service.clone(), self.credentials.clone())
    }
}

fn read_code(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))
}

fn write_code(path: &Path, code: &str) -> anyhow::Result<()> {
    std::fs::write(path, code).with_context(|| format!("cannot write {}", path.display()))
}

pub async fn generate(
    ctx: &Context,
    prompt: &str,
    model: &str,
    out: Option<&Path>,
) -> anyhow::Result<()> {
    let studio = Studio::new(ctx.service.clone(), model);
    let result = studio.generate(prompt).await;
    studio.shutdown().await;
    let snapshot = result?;

    match out {
        Some(path) => {
            write_code(path, &snapshot.code)?;
            eprintln!("wrote {} ({} bytes)", path.display(), snapshot.code.len());
        }
        None => println!("{}", snapshot.code),
    }
    if let Some(id) = snapshot.code_id {
        eprintln!("generation id: {id}");
    }
    Ok(())
}

pub async fn modify(
    ctx: &Context,
    file: &Path,
    prompt: &str,
    model: Option<String>,
    in_place: bool,
) -> anyhow::Result<()> {
    let code = read_code(file)?;
    if code.trim().is_empty() {
        bail!("{} is empty; generate some code first", file.display());
    }
    let request = ModifyCodeRequest {
        code,
        prompt: prompt.to_owned(),
        model: model.unwrap_or_else(|| DEFAULT_MODIFY_MODEL.to_owned()),
    };
    let raw = ctx.service.modify_code(&request).await?;
    let updated = strip_code_fences(&raw);

    if in_place {
        write_code(file, &updated)?;
        eprintln!("updated {}", file.display());
    } else {
        println!("{updated}");
    }
    Ok(())
}

pub async fn save(ctx: &Context, id: &str, file: &Path) -> anyhow::Result<()> {
    let code = read_code(file)?;
    let saved = ctx.service.save_code(&SaveCodeRequest::new(id, code)).await?;
    info!(id = %saved.data.id, "saved");
    eprintln!("saved {} at {}", saved.data.id, saved.data.updated_at.to_rfc3339());
    Ok(())
}

pub async fn show(ctx: &Context, id: &str) -> anyhow::Result<()> {
    let record = ctx.service.fetch_code(id).await?;
    eprintln!("model: {}  prompt: {}", record.model, record.prompt);
    println!("{}", strip_code_fences(&record.code));
    Ok(())
}

pub async fn sign_in(ctx: &Context, args: SignInArgs) -> anyhow::Result<()> {
    let form = SignInForm {
        email: args.email,
        password: args.password,
    };
    let user = ctx.auth().sign_in(&form).await?;
    eprintln!("signed in as {} <{}>", user.name, user.email);
    Ok(())
}

pub async fn sign_up(ctx: &Context, args: SignUpArgs) -> anyhow::Result<()> {
    let form = SignUpForm {
        full_name: args.name,
        email: args.email,
        confirm_password: args.confirm_password.unwrap_or_else(|| args.password.clone()),
        password: args.password,
    };
    let user = ctx.auth().sign_up(&form).await?;
    eprintln!("account created for {} <{}>", user.name, user.email);
    Ok(())
}

pub fn sign_out(ctx: &Context) -> anyhow::Result<()> {
    ctx.auth().sign_out()?;
    eprintln!("signed out");
    Ok(())
}

pub async fn whoami(ctx: &Context, remote: bool) -> anyhow::Result<()> {
    let Some(user) = ctx.auth().current_user()? else {
        bail!("not signed in");
    };
    if remote {
        let confirmed = ctx.service.current_user().await?;
        println!("{}", serde_json::to_string_pretty(&confirmed)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&user)?);
    }
    Ok(())
}

pub fn models() {
    for option in MODEL_CATALOG {
        let marker = if option.value == DEFAULT_MODEL { " (default)" } else { "" };
        println!("{}{marker}", option.label);
    }
}

pub async fn studio(ctx: &Context, model: &str, quiet_ms: u64) -> anyhow::Result<()> {
    let config = DispatcherConfig {
        quiet_period: Duration::from_millis(quiet_ms),
    };
    let studio = Studio::with_config(ctx.service.clone(), model, config);
    let result = repl::run(&studio).await;
    studio.shutdown().await;
    result
}
