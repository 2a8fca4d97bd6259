use std::{path::Path, process, sync::Arc};

use canopy::{
    application::{
        archive::{export_archive, read_archive, write_archive},
        error::AppError,
        posts::{MovePostCommand, PostService},
        spaces::{MoveSpaceCommand, SpaceService, SpaceTreeView},
    },
    cache::{CacheAudit, IndexMismatch, SpaceCache, SpaceCacheConfig},
    config::{self, AuditArgs, MovePostArgs, MoveSpaceArgs, Settings, TreeArgs},
    domain::error::DomainError,
    infra::{error::InfraError, memory::MemoryRepositories, telemetry},
};
use serde::Serialize;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli().map_err(|err| {
        AppError::from(InfraError::configuration(format!(
            "failed to load configuration: {err}"
        )))
    })?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match cli_args.command {
        config::Command::Tree(args) => run_tree(&settings, args).await,
        config::Command::Audit(args) => run_audit(&settings, args).await,
        config::Command::MoveSpace(args) => run_move_space(&settings, args).await,
        config::Command::MovePost(args) => run_move_post(&settings, args).await,
    }
}

/// Repositories seeded from an archive plus the services writing through
/// one shared space cache.
struct Workspace {
    repo: Arc<MemoryRepositories>,
    spaces: SpaceService,
    posts: PostService,
}

impl Workspace {
    async fn open(settings: &Settings, archive: &Path) -> Result<Self, AppError> {
        let archive = read_archive(archive)?;
        let repo = Arc::new(MemoryRepositories::from_archive(
            &archive,
            settings.spaces.max_depth,
        )?);
        let cache = Arc::new(SpaceCache::new(SpaceCacheConfig::from(&settings.cache)));

        let spaces = SpaceService::new(repo.clone(), cache.clone(), settings.spaces.max_depth);
        let posts = PostService::new(repo.clone(), cache, spaces.write_gate());
        spaces.load_cache().await?;

        Ok(Self {
            repo,
            spaces,
            posts,
        })
    }

    async fn save(&self, output: Option<&Path>) -> Result<(), AppError> {
        let Some(path) = output else {
            return Ok(());
        };

        let archive = export_archive(self.repo.as_ref(), self.repo.as_ref()).await?;
        write_archive(path, &archive)?;
        info!(
            target = "canopy::archive",
            path = %path.display(),
            spaces = archive.spaces.len(),
            posts = archive.posts.len(),
            "archive written"
        );
        Ok(())
    }
}

async fn run_tree(settings: &Settings, args: TreeArgs) -> Result<(), AppError> {
    let workspace = Workspace::open(settings, &args.archive).await?;
    let tree = workspace.spaces.tree();

    if args.json {
        return print_json(&tree);
    }
    for root in &tree {
        print_tree(root, 0);
    }
    Ok(())
}

async fn run_audit(settings: &Settings, args: AuditArgs) -> Result<(), AppError> {
    let workspace = Workspace::open(settings, &args.archive).await?;
    let audit = workspace.spaces.cache().audit();

    if args.json {
        print_json(&audit)?;
    } else {
        print_audit(&audit);
    }

    if audit.is_consistent() {
        Ok(())
    } else {
        Err(DomainError::invariant(format!(
            "{} counter drifts and {} index mismatches",
            audit.drifts.len(),
            audit.index_mismatches.len()
        ))
        .into())
    }
}

async fn run_move_space(settings: &Settings, args: MoveSpaceArgs) -> Result<(), AppError> {
    let workspace = Workspace::open(settings, &args.archive).await?;
    let moved = workspace
        .spaces
        .move_space(MoveSpaceCommand {
            id: args.space,
            parent_id: args.parent,
        })
        .await?;

    let ancestors = workspace.spaces.cache().get_ancestors(moved.id);
    println!(
        "moved space {} `{}` to depth {} (ancestors: {})",
        moved.id,
        moved.name,
        moved.depth,
        format_ids(&ancestors)
    );
    workspace.save(args.output.as_deref()).await
}

async fn run_move_post(settings: &Settings, args: MovePostArgs) -> Result<(), AppError> {
    let workspace = Workspace::open(settings, &args.archive).await?;
    let post = workspace
        .posts
        .move_post(MovePostCommand {
            id: args.post,
            space_id: args.space,
        })
        .await?;

    let space = workspace.spaces.find(post.space_id)?;
    println!(
        "moved post {} to space {} `{}` ({} direct, {} total)",
        post.id, space.id, space.name, space.post_count, space.recursive_post_count
    );
    workspace.save(args.output.as_deref()).await
}

fn print_tree(view: &SpaceTreeView, indent: usize) {
    println!(
        "{:indent$}{} [{}] posts={} total={}",
        "",
        view.name,
        view.id,
        view.post_count,
        view.recursive_post_count,
        indent = indent * 2
    );
    for child in &view.children {
        print_tree(child, indent + 1);
    }
}

fn print_audit(audit: &CacheAudit) {
    if audit.is_consistent() {
        println!("{} spaces, cache consistent", audit.nodes);
        return;
    }

    println!("{} spaces, cache inconsistent", audit.nodes);
    for drift in &audit.drifts {
        println!(
            "  space {}: recursive count {} but subtree holds {}",
            drift.id, drift.actual, drift.expected
        );
    }
    for mismatch in &audit.index_mismatches {
        let (label, parent, child) = match mismatch {
            IndexMismatch::Missing { parent, child } => ("missing from", parent, child),
            IndexMismatch::Stale { parent, child } => ("stale in", parent, child),
            IndexMismatch::Duplicate { parent, child } => ("duplicated in", parent, child),
        };
        println!("  space {child} {label} child list of {parent}");
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{out}");
    Ok(())
}

fn format_ids(ids: &[i64]) -> String {
    if ids.is_empty() {
        return "none".to_string();
    }
    ids.iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
