//! Release Pilot CLI
//!
//! `release` drafts a GitHub release for the latest tag. `release bump <kind>`
//! increments the manifest version.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anstyle::{AnsiColor, Color, Style};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use release_pilot::changelog::ChangelogRenderer;
use release_pilot::config::OpenMode;
use release_pilot::{
    bump_version, default_pipeline, run_release, Authenticator, Bump, ChangelogHook, CommandHook,
    Context, Error, FileTokenStore, GitCli, GitHubClient, PluginCatalog, PluginInit,
    PluginLoaders, PrintOpener, Progress, ReleaseConfig, Result, SystemOpener, TemplateRenderer,
    TerminalPrompter, UrlOpener, Validate,
};

/// Compose a changelog from tagged commits and publish it as a GitHub release
#[derive(Parser)]
#[command(name = "release")]
#[command(version, about, long_about = None)]
#[command(styles = get_styles())]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Mark the release as a prerelease
    #[arg(long)]
    pre: bool,

    /// Replace an existing release for the same tag
    #[arg(long)]
    overwrite: bool,

    /// Publish the release instead of leaving a draft
    #[arg(long)]
    publish: bool,

    /// Program the rendered changelog is piped through
    #[arg(long, value_name = "PATH")]
    hook: Option<PathBuf>,

    /// Colon-separated plugin list (./manifest.toml, /abs/manifest.toml, name)
    #[arg(long, value_name = "SPECIFIERS")]
    plugins: Option<String>,

    /// Configuration file (default: release.toml or .github/release.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print release URLs instead of opening a browser
    #[arg(long)]
    print: bool,

    /// Show debug logs and error details
    #[arg(long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Increment the version in Cargo.toml or package.json
    Bump {
        /// major, minor, patch, premajor, preminor, prepatch or prerelease
        kind: Bump,
    },
}

fn get_styles() -> clap::builder::Styles {
    clap::builder::Styles::styled()
        .header(Style::new().bold().fg_color(Some(Color::Ansi(AnsiColor::Yellow))))
        .usage(Style::new().bold().fg_color(Some(Color::Ansi(AnsiColor::Yellow))))
        .literal(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Green))))
        .placeholder(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Cyan))))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let progress = Progress::stderr();
    let debug = cli.debug;

    if let Err(e) = run(cli, progress.clone()).await {
        progress.clear();
        report(&e, debug);
        std::process::exit(1);
    }
}

fn report(error: &Error, debug: bool) {
    let banner = Style::new().bold().fg_color(Some(Color::Ansi(AnsiColor::Red)));
    if error.is_expected_outcome() {
        let note = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Yellow)));
        eprintln!("{note}{}{note:#}", error);
        return;
    }

    eprintln!("{banner}Error!{banner:#} {}", error);
    if debug {
        eprintln!("{:#?}", error);
    }
}

async fn run(cli: Cli, progress: Progress) -> Result<()> {
    let cwd = std::env::current_dir()?;

    if let Some(Commands::Bump { kind }) = cli.command {
        return bump(&cwd, kind, &progress);
    }

    let mut config = ReleaseConfig::load(&cwd, cli.config.as_deref())?;
    config.pre = cli.pre;
    config.overwrite = cli.overwrite;
    config.publish = cli.publish;
    if cli.hook.is_some() {
        config.hook = cli.hook;
    }
    if cli.plugins.is_some() {
        config.plugins = cli.plugins;
    }
    if cli.print {
        config.open = OpenMode::Print;
    }

    for warning in config.validate().into_result()? {
        progress.warn(warning);
    }

    let opener: Arc<dyn UrlOpener> = match config.open {
        OpenMode::Browser => Arc::new(SystemOpener),
        OpenMode::Print => Arc::new(PrintOpener::new(progress.clone())),
    };

    let hook: Option<Arc<dyn ChangelogHook>> = match &config.hook {
        Some(path) => Some(Arc::new(CommandHook::from_path(&cwd, path)?)),
        None => None,
    };

    let plugins = match &config.plugins {
        Some(list) => {
            let init = PluginInit {
                working_dir: cwd.clone(),
                progress: progress.clone(),
            };
            Some(PluginLoaders::standard(PluginCatalog::default()).load_list(list, &init)?)
        }
        None => None,
    };

    let mut renderer = if config.skip_questions {
        TemplateRenderer::flat()
    } else {
        TemplateRenderer::new()
    };
    if let Some(template) = &config.template {
        renderer = renderer.with_template(template.clone());
    }
    let renderer: Arc<dyn ChangelogRenderer> = Arc::new(renderer);

    let token = Authenticator::new(
        config.auth.clone(),
        Box::new(FileTokenStore::user_default()?),
        Arc::clone(&opener),
        progress.clone(),
    )
    .token(|name| std::env::var(name).ok())
    .await?;
    let host = Arc::new(GitHubClient::new(token)?);

    let mut ctx = Context::new(
        config,
        Arc::new(GitCli::new(cwd.clone())),
        host,
        Arc::new(TerminalPrompter::stdin(progress.clone())),
        renderer,
        opener,
        progress,
    );
    if let Some(hook) = hook {
        ctx = ctx.with_hook(hook);
    }
    if let Some(plugins) = plugins {
        ctx = ctx.with_plugins(plugins);
    }

    let release = run_release(&ctx, &default_pipeline).await?;
    tracing::debug!(tag = ?release.tag_name(), id = ?release.id(), "release finished");
    Ok(())
}

fn bump(dir: &Path, kind: Bump, progress: &Progress) -> Result<()> {
    let outcome = bump_version(dir, kind)?;

    if std::io::stdout().is_terminal() {
        for file in &outcome.files {
            progress.info(format!("Updated {}", file.display()));
        }
        let bold = Style::new().bold();
        println!("Bumped {} → {bold}{}{bold:#}", outcome.previous, outcome.version);
    } else {
        println!("{}", outcome.version);
    }
    Ok(())
}
