//! HostFiles CLI - Remote File Management over SFTP
//!
//! Browse, transfer and bulk-upload files on remote hosts.

use clap::Parser;
use hostfiles::config::{AppConfig, CliArgs, Commands, LogFormat, RemoteConfig, TargetCommands};
use hostfiles::error::{HostFilesError, IoResultExt, Result};
use hostfiles::fs::{DirEntry, EntryType, ReadMode, ReadOutcome};
use hostfiles::notify::TracingSink;
use hostfiles::remote::{RemoteFs, SftpSession};
use hostfiles::target::{FileTarget, RegistryResolver, SessionResolver, StaticResolver, TargetConfig, TargetStore};
use hostfiles::upload::{FolderUploadPlan, UploadProgress};
use hostfiles::FileService;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Target id used for a host given directly with `--remote`
const AD_HOC_TARGET_ID: u64 = 0;

type Service = FileService<Box<dyn SessionResolver>>;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Initialize logging
    init_logging(args.verbose, args.log_format);

    // Handle result
    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8, format: LogFormat) {
    let default_level = match verbose {
        0 => "hostfiles=info",
        1 => "hostfiles=debug",
        _ => "hostfiles=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn run(args: CliArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    config.apply_cli(&args)?;

    if let Commands::Targets(command) = &args.command {
        return cmd_targets(command, &args, &config);
    }

    let (service, target_id) = build_service(&args, &config)?;
    let recipient = config
        .recipient
        .clone()
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "hostfiles".to_string());

    handle_command(&args.command, &service, target_id, &recipient)
}

fn build_service(args: &CliArgs, config: &AppConfig) -> Result<(Service, u64)> {
    let sink = Arc::new(TracingSink);

    if let Some(spec) = &args.remote {
        let mut remote = RemoteConfig::from_spec(spec)?;
        remote.key_path = args.key.clone();
        remote.password = args.password.clone();

        let session: Arc<dyn RemoteFs> = Arc::new(SftpSession::connect(&remote)?);
        let target = FileTarget::new(AD_HOC_TARGET_ID, session, remote.host.clone(), remote.address());
        let resolver: Box<dyn SessionResolver> = Box::new(StaticResolver::new().with_target(target));
        return Ok((FileService::new(resolver, config.limits, sink), AD_HOC_TARGET_ID));
    }

    let target_id = args
        .target_id
        .ok_or_else(|| HostFilesError::config("either --remote or --target-id is required"))?;

    let store = TargetStore::open(config.registry_path())?;
    let key = args.key.clone();
    let password = args.password.clone();
    let resolver = RegistryResolver::new(store, move |target: &TargetConfig| {
        let mut remote = target.remote.clone();
        if remote.key_path.is_none() {
            remote.key_path = key.clone();
        }
        remote.password = password.clone();
        let session: Arc<dyn RemoteFs> = Arc::new(SftpSession::connect(&remote)?);
        Ok(session)
    });

    let resolver: Box<dyn SessionResolver> = Box::new(resolver);
    Ok((FileService::new(resolver, config.limits, sink), target_id))
}

fn handle_command(command: &Commands, service: &Service, id: u64, recipient: &str) -> Result<()> {
    match command {
        Commands::List { path, json } => cmd_list(service, id, path, *json),
        Commands::DirSize { path } => {
            let size = service.dir_size(id, path)?;
            println!("{}\t{}", format_size(size, BINARY), path);
            Ok(())
        }
        Commands::Stat { path } => {
            let entry = service.stat(id, path)?;
            print_entry_details(&entry);
            Ok(())
        }
        Commands::View { path } => match service.read(id, path, ReadMode::Inline)? {
            ReadOutcome::Inline(text) => {
                print!("{}", text);
                Ok(())
            }
            ReadOutcome::Download(_) => Err(HostFilesError::invalid("unexpected download outcome")),
        },
        Commands::Download { path, local } => cmd_download(service, id, path, local.as_deref()),
        Commands::Create { path, kind } => service.create(id, path, *kind),
        Commands::Write { path, local } => {
            let content = std::fs::read(local).local_path(local.display().to_string())?;
            service.write(id, path, &content)
        }
        Commands::Upload { local, remote_dir } => cmd_upload(service, id, local, remote_dir, recipient),
        Commands::UploadFolder { local, remote_base } => {
            cmd_upload_folder(service, id, local, remote_base, recipient)
        }
        Commands::Remove { paths } => service.remove(id, paths),
        Commands::Copy { paths } => {
            let (to, from) = split_destination(paths)?;
            service.copy(id, from, to)
        }
        Commands::Move { paths } => {
            let (to, from) = split_destination(paths)?;
            service.move_paths(id, from, to)
        }
        Commands::Rename { path, new_name } => {
            let new_path = service.rename(id, path, new_name)?;
            println!("{}", new_path);
            Ok(())
        }
        Commands::Targets(_) => Err(HostFilesError::invalid("targets takes no remote session")),
    }
}

/// Last argument is the destination, the rest are sources
fn split_destination(paths: &[String]) -> Result<(&str, &[String])> {
    match paths.split_last() {
        Some((to, from)) if !from.is_empty() => Ok((to.as_str(), from)),
        _ => Err(HostFilesError::invalid("expected one or more sources and a destination")),
    }
}

fn cmd_list(service: &Service, id: u64, path: &str, json: bool) -> Result<()> {
    let entries = service.list_dir(id, path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for entry in &entries {
        let suffix = if entry.entry_type == EntryType::Dir { "/" } else { "" };
        println!(
            "{} {:>10}  {}  {}{}",
            entry.mode, entry.size, entry.modified, entry.name, suffix
        );
    }
    Ok(())
}

fn print_entry_details(entry: &DirEntry) {
    println!("Path:     {}", entry.path);
    println!("Type:     {}", entry.entry_type.code());
    println!("Mode:     {}", entry.mode);
    println!("Size:     {} ({} bytes)", format_size(entry.size, BINARY), entry.size);
    println!("Modified: {}", entry.modified);
}

fn cmd_download(service: &Service, id: u64, path: &str, local: Option<&Path>) -> Result<()> {
    let download = match service.read(id, path, ReadMode::Download)? {
        ReadOutcome::Download(download) => download,
        ReadOutcome::Inline(_) => return Err(HostFilesError::invalid("unexpected inline outcome")),
    };

    let dest = match local {
        Some(p) if p.is_dir() => p.join(&download.filename),
        Some(p) => p.to_path_buf(),
        None => PathBuf::from(&download.filename),
    };

    let file = std::fs::File::create(&dest).local_path(dest.display().to_string())?;
    let pb = ProgressBar::new(download.size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );

    let mut writer = pb.wrap_write(file);
    let bytes = download.stream_to(&mut writer)?;
    pb.finish_and_clear();

    println!("Downloaded {} ({})", dest.display(), format_size(bytes, BINARY));
    Ok(())
}

fn cmd_upload(service: &Service, id: u64, local: &Path, remote_dir: &str, recipient: &str) -> Result<()> {
    let filename = local
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| HostFilesError::invalid(format!("'{}' is not a file", local.display())))?;
    let size = std::fs::metadata(local)
        .local_path(local.display().to_string())?
        .len();
    let mut file = std::fs::File::open(local).local_path(local.display().to_string())?;

    let bytes = service.upload_file(id, remote_dir, &filename, size, &mut file, recipient)?;
    println!("Uploaded {} ({})", filename, format_size(bytes, BINARY));
    Ok(())
}

fn cmd_upload_folder(
    service: &Service,
    id: u64,
    local: &Path,
    remote_base: &str,
    recipient: &str,
) -> Result<()> {
    let plan = FolderUploadPlan::from_local_dir(local, remote_base)?;
    let total_files = plan.len();

    let pb = ProgressBar::new(plan.total_size());
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );

    let progress = UploadProgress::new();
    let done = AtomicBool::new(false);

    let report = std::thread::scope(|scope| {
        scope.spawn(|| {
            while !done.load(Ordering::SeqCst) {
                let snapshot = progress.snapshot();
                pb.set_position(snapshot.bytes);
                pb.set_message(format!("{}/{} files", snapshot.files, total_files));
                std::thread::sleep(Duration::from_millis(100));
            }
        });

        let report = service.upload_folder_with_progress(id, plan, recipient, &progress);
        done.store(true, Ordering::SeqCst);
        report
    })?;
    pb.finish_and_clear();

    report.print_summary();
    match report.failure() {
        Some(failure) => Err(failure),
        None => Ok(()),
    }
}

fn cmd_targets(command: &TargetCommands, args: &CliArgs, config: &AppConfig) -> Result<()> {
    let mut store = TargetStore::open(config.registry_path())?;

    match command {
        TargetCommands::List => {
            if store.list().is_empty() {
                println!("No saved targets in {}", store.path().display());
            }
            for target in store.list() {
                println!(
                    "{:>4}  {:<20} {}@{}  {}",
                    target.id,
                    target.name,
                    target.remote.user,
                    target.remote.address(),
                    target.base_path
                );
            }
        }
        TargetCommands::Add { name, remote, base_path } => {
            let mut remote = RemoteConfig::from_spec(remote)?;
            remote.key_path = args.key.clone();
            let id = store.save(TargetConfig {
                id: 0,
                name: name.clone(),
                remote,
                base_path: base_path.clone(),
            })?;
            println!("Saved target {} ({})", id, name);
        }
        TargetCommands::Remove { id } => {
            let removed = store.delete(*id)?;
            println!("Removed target {} ({})", removed.id, removed.name);
        }
    }
    Ok(())
}
