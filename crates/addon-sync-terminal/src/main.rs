use addon_sync::installation::updater::UpdateOutcome;
use addon_sync::installation::UpdateError;
use tokio_util::sync::CancellationToken;

const USAGE: &str = "Usage: addon-sync [options] <command>

Commands:
    add <project id> <name>  Add an addon to the watch list
    list                     Show the watch list
    check                    Poll the catalog and show available updates
    update                   Install available updates
    watch                    Poll and update on an interval until interrupted";

#[tokio::main]
async fn main() {
	let mut opts;

	/* Parse console input */
	let parsed_options = {
		let args: Vec<String> = std::env::args().collect();

		opts = getopts::Options::new();
		opts.optflag( "h", "help",    "Show help");
		opts.optflag( "v", "verbose", "Increased vebosity");
		opts.optopt(  "c", "config",  "Config file to use", "PATH");
		opts.parsing_style(getopts::ParsingStyle::FloatingFrees);

		let parsed_options = match opts.parse(&args[1..]) {
			Ok(m)  => { m }
			Err(e) => { println!("Unable to parse options: {}", e); return }
		};

		if parsed_options.opt_present("h") {
			eprintln!("{}", opts.usage(USAGE));
			return;
		}

		parsed_options
	};

	let default_filter = if parsed_options.opt_present("v") { "debug" } else { "info" };
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

	let config_path = parsed_options
		.opt_str("c")
		.map(std::path::PathBuf::from)
		.unwrap_or_else(|| addon_sync::Config::default().data_dir().join("config.json"));

	let config = addon_sync::Config::load_or_create(&config_path).unwrap_or_else(|e| {
		log::warn!("Failed to read config file {}: {}", config_path.display(), e);
		log::warn!("Using default config.");
		addon_sync::Config::default()
	});

	let pipeline = match addon_sync::Pipeline::open(config) {
		Ok(p) => p,
		Err(e) => {
			log::error!("Failed to start: {}", e);
			std::process::exit(1);
		},
	};

	let cancel = CancellationToken::new();
	{
		let cancel = cancel.clone();
		tokio::spawn(async move {
			if tokio::signal::ctrl_c().await.is_ok() {
				log::info!("Interrupted, finishing up.");
				cancel.cancel();
			}
		});
	}

	let result = match parsed_options.free.first().map(String::as_str) {
		Some("add") => add(&pipeline, &parsed_options.free[1..]),
		Some("list") => list(&pipeline),
		Some("check") => check(&pipeline, &cancel).await,
		Some("update") => update(&pipeline, &cancel).await.map(|_| ()),
		Some("watch") => watch(&pipeline, &cancel).await,
		Some(other) => Err(Error::UnknownCommand(other.to_string())),
		None => {
			eprintln!("{}", opts.usage(USAGE));
			return;
		},
	};

	if let Err(e) = result {
		log::error!("{}", e);
		std::process::exit(1);
	}
}

fn add(pipeline: &addon_sync::Pipeline, args: &[String]) -> Result<(), Error> {
	let project_id = args.first().ok_or(Error::MissingArgument("project id"))?;
	let project_id = project_id.parse::<i64>().map_err(|_| Error::InvalidProjectId(project_id.clone()))?;
	let name = match args.get(1..) {
		Some(rest) if !rest.is_empty() => rest.join(" "),
		_ => return Err(Error::MissingArgument("name")),
	};

	pipeline.ledger().add_wanted(project_id, &name)?;
	println!("Added {} ({}) to the watch list.", name, project_id);
	Ok(())
}

fn list(pipeline: &addon_sync::Pipeline) -> Result<(), Error> {
	let wanted = pipeline.ledger().list_wanted()?;
	if wanted.is_empty() {
		println!("The watch list is empty.");
	}
	for addon in wanted {
		let installed = addon.installed_version_id.map_or("not installed".to_string(), |v| v.to_string());
		let checked = addon.last_checked.map_or("never".to_string(), |t| t.to_rfc3339());
		println!("\t{:>10}  {:<32} installed: {:<14} checked: {}", addon.project_id, addon.name, installed, checked);
	}
	Ok(())
}

async fn check(pipeline: &addon_sync::Pipeline, cancel: &CancellationToken) -> Result<(), Error> {
	let (summary, targets) = pipeline.check_for_updates(cancel).await?;
	for (project_id, failure) in &summary.failures {
		println!("Couldn't check project {}: {}", project_id, failure);
	}
	if targets.is_empty() {
		println!("Everything is up to date.");
		return Ok(());
	}
	println!("Updates available:");
	for target in &targets {
		println!("\t{} ({}, game version {})", target, target.version.file_name, target.version.matched_game_version);
	}
	Ok(())
}

async fn update(pipeline: &addon_sync::Pipeline, cancel: &CancellationToken) -> Result<usize, Error> {
	let outcomes = pipeline.update_all(cancel).await?;
	if outcomes.is_empty() {
		println!("Nothing to update.");
	}

	let mut failed = 0;
	for UpdateOutcome { target, result } in outcomes {
		let result = match result {
			Err(UpdateError::CommitFailed(e)) => {
				log::warn!("Retrying ledger commit for {} after: {}", target, e);
				pipeline.updater().retry_commit(&target).await
			},
			other => other,
		};
		match result {
			Ok(()) => println!("Updated {}", target),
			Err(e) => {
				failed += 1;
				println!("Failed to update {}: {}", target, e);
			},
		}
	}
	Ok(failed)
}

async fn watch(pipeline: &addon_sync::Pipeline, cancel: &CancellationToken) -> Result<(), Error> {
	let interval = pipeline.config().poll_interval();
	log::info!("Checking for updates every {} seconds.", interval.as_secs());
	loop {
		let summary = pipeline.poll(cancel).await?;
		for (project_id, failure) in &summary.failures {
			log::warn!("Couldn't check project {}: {}", project_id, failure);
		}
		let failed = update(pipeline, cancel).await?;
		if failed > 0 {
			log::warn!("{} update(s) failed, retrying next cycle.", failed);
		}

		tokio::select! {
			_ = cancel.cancelled() => return Ok(()),
			_ = tokio::time::sleep(interval) => {},
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("addon-sync error: {0}")]
	AddonSync(#[from] addon_sync::Error),
	#[error("missing argument: {0}")]
	MissingArgument(&'static str),
	#[error("project id must be a number, got {0}")]
	InvalidProjectId(String),
	#[error("unknown command {0}, see --help")]
	UnknownCommand(String),
}
