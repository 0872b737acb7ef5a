//! `sl deps` - declare, lock and verify dependencies.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use specledger_core::{
    cancellation, Dependency, GitCliTransport, LedgerError, Lockfile, Manifest, ResolverConfig,
    SpecResolver,
};

use crate::cli::args::{DepsAddArgs, DepsListArgs, DepsRemoveArgs, DepsResolveArgs};
use crate::cli::project::Project;
use crate::exit_codes::SUCCESS;

fn resolver(config: ResolverConfig) -> Result<SpecResolver> {
    let transport = GitCliTransport::from_env()?;
    Ok(SpecResolver::new(config, Arc::new(transport))?)
}

async fn read_lockfile_if_present(project: &Project) -> Result<Option<Lockfile>> {
    let path = project.lockfile_path();
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(Lockfile::read(&path).await?))
}

pub async fn cmd_add(dir: Option<&Path>, args: DepsAddArgs) -> Result<i32> {
    let project = Project::from_cli(dir)?;
    let mut manifest = Manifest::load(project.manifest_path()).await?;

    let mut dependency = Dependency::new(&args.url).with_version(&args.version);
    if let Some(alias) = &args.alias {
        dependency = dependency.with_alias(alias);
    }

    // Reject obvious mistakes before spending a clone on detection.
    manifest.validate(&dependency)?;

    if args.detect {
        eprintln!("Detecting artifact path in {}@{}...", args.url, args.version);
        let detected = resolver(ResolverConfig::from_env())?
            .detect_remote_artifact_path(&args.url, &args.version)
            .await?;
        eprintln!("Detected spec file {}", detected);
        dependency = dependency.with_spec_path(detected);
    } else if let Some(spec_path) = &args.spec_path {
        dependency = dependency.with_spec_path(spec_path);
    }

    let summary = format!(
        "{}@{} ({})",
        dependency.repository_url, dependency.version, dependency.spec_path
    );
    let alias = dependency.alias().map(String::from);

    manifest.add(dependency)?;
    manifest.save(project.manifest_path()).await?;

    match alias {
        Some(alias) => println!("Added {} as '{}'", summary, alias),
        None => println!("Added {}", summary),
    }
    println!("Run `sl deps resolve` to update the lockfile.");
    Ok(SUCCESS)
}

pub async fn cmd_list(dir: Option<&Path>, args: DepsListArgs) -> Result<i32> {
    let project = Project::from_cli(dir)?;
    let manifest = Manifest::load(project.manifest_path()).await?;
    let lockfile = read_lockfile_if_present(&project).await?;

    let locked_commit = |dep: &Dependency| {
        lockfile
            .as_ref()
            .and_then(|l| l.get_entry(&dep.repository_url, &dep.spec_path))
            .map(|e| e.commit_hash.clone())
    };

    if args.json {
        let deps: Vec<serde_json::Value> = manifest
            .dependencies
            .iter()
            .map(|d| {
                serde_json::json!({
                    "repository_url": d.repository_url,
                    "version": d.version,
                    "spec_path": d.spec_path,
                    "alias": d.alias(),
                    "commit_hash": locked_commit(d),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&deps)?);
        return Ok(SUCCESS);
    }

    if manifest.is_empty() {
        println!("No dependencies declared.");
        return Ok(SUCCESS);
    }

    println!(
        "{:<12} {:<48} {:<12} {:<24} LOCKED",
        "ALIAS", "REPOSITORY", "VERSION", "SPEC PATH"
    );
    for dep in &manifest.dependencies {
        let locked = locked_commit(dep)
            .map(|c| c.chars().take(12).collect::<String>())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<12} {:<48} {:<12} {:<24} {}",
            dep.alias().unwrap_or("-"),
            dep.repository_url,
            dep.version,
            dep.spec_path,
            locked
        );
    }
    Ok(SUCCESS)
}

pub async fn cmd_remove(dir: Option<&Path>, args: DepsRemoveArgs) -> Result<i32> {
    let project = Project::from_cli(dir)?;
    let mut manifest = Manifest::load(project.manifest_path()).await?;

    let Some(url) = manifest
        .find(&args.target)
        .map(|d| d.repository_url.clone())
    else {
        return Err(LedgerError::DependencyNotFound {
            target: args.target,
        }
        .into());
    };
    manifest.remove(&args.target);
    manifest.save(project.manifest_path()).await?;

    println!("Removed {}", url);
    println!("Run `sl deps resolve` to update the lockfile.");
    Ok(SUCCESS)
}

pub async fn cmd_resolve(dir: Option<&Path>, args: DepsResolveArgs) -> Result<i32> {
    let project = Project::from_cli(dir)?;
    let manifest = Manifest::load(project.manifest_path()).await?;

    let mut config = ResolverConfig::from_env();
    if args.no_cache {
        config = config.no_cache();
    }
    if args.keep_going {
        config = config.keep_going();
    }
    if let Some(jobs) = args.jobs {
        config = config.with_parallelism(jobs);
    }
    let resolver = resolver(config)?;

    let (handle, token) = cancellation();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling...");
            handle.cancel();
        }
    });

    let result = resolver.resolve(&manifest, &token).await;
    ctrl_c.abort();
    let report = result?;

    for resolved in &report.resolved {
        let dep = &resolved.dependency;
        println!(
            "  {:<6} {}@{} {} {}",
            resolved.source,
            dep.repository_url,
            dep.version,
            resolved.commit_hash.chars().take(12).collect::<String>(),
            dep.spec_path
        );
    }

    if let Some(first) = report.failures.first() {
        for failure in &report.failures {
            eprintln!("  failed {}: {}", failure.dependency.repository_url, failure.error);
        }
        eprintln!(
            "{} of {} dependencies failed; lockfile not written",
            report.failures.len(),
            manifest.len()
        );
        return Ok(first.error.exit_code());
    }

    let lockfile = Lockfile::from_resolved(&manifest.version, &report.resolved);
    lockfile
        .write(project.lockfile_path())
        .await
        .with_context(|| "failed to write lockfile")?;

    println!(
        "Locked {} dependencies ({} bytes)",
        lockfile.entries().len(),
        lockfile.total_size()
    );
    Ok(SUCCESS)
}

pub async fn cmd_verify(dir: Option<&Path>) -> Result<i32> {
    let project = Project::from_cli(dir)?;
    let manifest = Manifest::load(project.manifest_path()).await?;
    let lockfile = Lockfile::read(project.lockfile_path()).await?;

    if let Err(e) = lockfile.verify(&manifest) {
        if let LedgerError::LockfileIncomplete { issues } = &e {
            for issue in issues {
                eprintln!("  {}", issue);
            }
        }
        return Err(e.into());
    }

    let stale = lockfile
        .entries()
        .iter()
        .filter(|e| {
            !manifest
                .dependencies
                .iter()
                .any(|d| e.is_keyed(&d.repository_url, &d.spec_path))
        })
        .count();
    if stale > 0 {
        eprintln!(
            "warning: {} lock entr{} no longer declared; run `sl deps resolve`",
            stale,
            if stale == 1 { "y is" } else { "ies are" }
        );
    }

    println!(
        "Lockfile covers all {} dependencies ({} entries)",
        manifest.len(),
        lockfile.entries().len()
    );
    Ok(SUCCESS)
}
