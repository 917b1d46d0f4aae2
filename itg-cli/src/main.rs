mod cli;
mod output;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use cli::{AddArgs, Cli, Commands, DraftCommands, EditArgs, ListArgs};
use itg_collect::geo::Coordinates;
use itg_collect::{
    ApiClient, Collect, CollectConfig, FileStore, KeyValueStore, MemoryStore, SubmissionPayload,
    SubmitOutcome,
};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type App = Collect<ApiClient>;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "itg_collect=info,itg=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Commands::ConfigPath = cli.command {
        return print_config_path();
    }

    let config = CollectConfig::load().context("Failed to load config")?;
    let storage: Arc<dyn KeyValueStore> = if cli.ephemeral {
        Arc::new(MemoryStore::new())
    } else {
        let dir = config.data_dir().context("Cannot determine data directory")?;
        Arc::new(FileStore::new(dir))
    };
    let api = if cli.dev {
        println!("Running against the local dev backend.");
        ApiClient::dev()?
    } else {
        ApiClient::new(&config.api_url, None)
            .with_context(|| format!("Invalid api_url in config: {}", config.api_url))?
    };

    debug!(api_url = %config.api_url, dev = cli.dev, ephemeral = cli.ephemeral, "Starting");
    let mut app = Collect::new(Arc::new(api), storage, config.cache_ttl());
    let result = run(&mut app, cli.command).await;
    output::print_toasts(app.app.notifications());
    result
}

fn print_config_path() -> Result<()> {
    let path = CollectConfig::config_path()?;
    if !path.exists() {
        CollectConfig::default()
            .save()
            .context("Failed to write default config")?;
        println!("Created default config.");
    }
    println!("{}", path.display());
    Ok(())
}

async fn run(app: &mut App, command: Commands) -> Result<()> {
    match command {
        Commands::Login { email } => {
            let password = rpassword::prompt_password("Password: ")?;
            app.login(&email, &password).await.context("Login failed")?;
            println!("Signed in as {}.", app.session.display_name());
        }
        Commands::Register { name, email } => {
            let password = rpassword::prompt_password("Password: ")?;
            let confirmation = rpassword::prompt_password("Confirm password: ")?;
            if password != confirmation {
                bail!("Passwords do not match");
            }
            app.register(&name, &email, &password, &confirmation)
                .await
                .context("Registration failed")?;
            println!("Welcome, {}.", app.session.display_name());
        }
        Commands::Logout => {
            let pending = app.sync.pending_count();
            app.logout()?;
            if pending > 0 {
                println!("Discarded {pending} unsynced submission(s).");
            }
            println!("Signed out.");
        }
        Commands::List(args) => list(app, args).await?,
        Commands::Recent { category, server } => {
            if server {
                let recent: Vec<_> = app
                    .api()
                    .get_recent()
                    .await
                    .context("Failed to load recent entries")?
                    .into_iter()
                    .map(|record| record.into_entry())
                    .collect();
                output::print_entries(&recent);
            } else {
                load_entries(app, false).await?;
                output::print_entries(&app.entries.recently_added_by_category(&category));
            }
        }
        Commands::Show { id } => {
            let entry = app
                .api()
                .get_entry(&id)
                .await
                .with_context(|| format!("Failed to load entry {id}"))?
                .into_entry();
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
        Commands::Edit(args) => edit(app, args).await?,
        Commands::Nearby { lat, lng, radius } => {
            let count = app
                .api()
                .count_in_radius(lat, lng, radius)
                .await
                .context("Failed to count nearby entries")?;
            println!("{count} entries within {radius} m.");
        }
        Commands::Add(args) => add(app, args).await?,
        Commands::Delete { id } => {
            app.delete_entry(&id)
                .await
                .with_context(|| format!("Failed to delete entry {id}"))?;
            println!("Deleted {id}.");
        }
        Commands::Sync => {
            let report = app.sync_now().await;
            if report.skipped {
                println!("Nothing to sync.");
            } else if let Some(id) = report.halted_on {
                println!(
                    "Synced {}, {} still pending (stopped at {id}).",
                    report.synced, report.remaining
                );
            }
        }
        Commands::Pending => output::print_pending(app.sync.pending()),
        Commands::Drafts(command) => drafts(app, command).await?,
        Commands::Favourite { id } => {
            if app.session.toggle_favourite(&id)? {
                println!("Added {id} to favourites.");
            } else {
                println!("Removed {id} from favourites.");
            }
        }
        Commands::Suggest {
            lat,
            lng,
            keyword,
            did_you_mean,
        } => {
            let suggestions = if did_you_mean {
                app.api().did_you_mean(lat, lng, &keyword).await?
            } else {
                app.api().location_suggestions(lat, lng, &keyword).await?
            };
            output::print_suggestions(&suggestions);
        }
        Commands::Feedback { message } => {
            app.api()
                .submit_feedback(&message, &[])
                .await
                .context("Failed to send feedback")?;
            println!("Thanks for the feedback.");
        }
        Commands::ConfigPath => print_config_path()?,
    }
    Ok(())
}

/// Fetch entries; a failure is only fatal when there is nothing to show.
async fn load_entries(app: &mut App, force_refresh: bool) -> Result<()> {
    if let Err(e) = app.entries.fetch(force_refresh).await {
        if app.entries.entries().is_empty() {
            return Err(e).context("Failed to load entries");
        }
        eprintln!("Warning: showing stale entries: {e}");
    }
    Ok(())
}

async fn list(app: &mut App, args: ListArgs) -> Result<()> {
    let store = &mut app.entries;
    if let Some(search) = args.search {
        store.set_search_query(search);
    }
    if args.mine {
        store.toggle_only_show_my_entries();
    }
    store.set_category_filter(args.category);
    store.set_added_within_days(args.days);
    for tag in &args.tags {
        store.toggle_tag_filter(tag);
    }
    store.set_sort_by(args.sort);
    if let Some([lat, lng]) = args.near.as_deref() {
        store.set_current_location(Some(Coordinates::new(*lat, *lng)));
    }

    load_entries(app, args.refresh).await?;

    let entries = if args.favourites {
        app.my_favourites()
    } else {
        app.filtered_entries()
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        output::print_entries(&entries);
    }
    Ok(())
}

async fn add(app: &mut App, args: AddArgs) -> Result<()> {
    if args.offline {
        app.set_online(false).await;
    }

    let mut payload = SubmissionPayload::new(args.lat, args.lng, args.name);
    payload.description = args.description;
    payload.rating = args.rating;
    payload.review = args.review;
    payload.tags = (!args.tags.is_empty()).then_some(args.tags);

    report_outcome(app.submit_entry(payload).await?);
    Ok(())
}

/// Load the entry, apply the given overrides and send the whole payload back.
async fn edit(app: &mut App, args: EditArgs) -> Result<()> {
    let current = app
        .api()
        .get_entry(&args.id)
        .await
        .with_context(|| format!("Failed to load entry {}", args.id))?
        .into_entry();
    let Some(point) = current.coordinates() else {
        bail!("Entry {} has no location and cannot be edited", args.id);
    };

    let mut payload = SubmissionPayload::new(
        point.lat,
        point.lng,
        args.name.unwrap_or(current.name),
    );
    payload.description = args.description.or(current.description);
    payload.rating = args
        .rating
        .or_else(|| current.rating.map(|r| r.round().clamp(1.0, 5.0) as u8));
    payload.review = args.review.or(current.review);
    let tags = if args.tags.is_empty() {
        current.tags
    } else {
        args.tags
    };
    payload.tags = (!tags.is_empty()).then_some(tags);

    let updated = app
        .api()
        .update_entry(&args.id, &payload)
        .await
        .with_context(|| format!("Failed to update entry {}", args.id))?
        .into_entry();
    app.entries.clear_cache();
    println!("Updated entry {} ({}).", updated.id, updated.name);
    Ok(())
}

fn report_outcome(outcome: SubmitOutcome) {
    match outcome {
        SubmitOutcome::Created(entry) => println!("Created entry {} ({}).", entry.id, entry.name),
        SubmitOutcome::Queued { id, reason } => {
            if let Some(reason) = reason {
                eprintln!("Could not reach the backend: {reason}");
            }
            println!("Queued as {id}. Run `itg sync` when back online.");
        }
    }
}

async fn drafts(app: &mut App, command: DraftCommands) -> Result<()> {
    match command {
        DraftCommands::List => output::print_drafts(app.drafts.drafts()),
        DraftCommands::New {
            name,
            lat,
            lng,
            description,
            tags,
        } => {
            let drafts = &mut app.drafts;
            let draft = drafts.reset_draft()?;
            drafts.set_name(name)?;
            drafts.set_lat(lat)?;
            drafts.set_lng(lng)?;
            if let Some(description) = description {
                drafts.set_description(description)?;
            }
            drafts.set_tags(tags)?;
            println!("Saved draft {}.", draft.draft_id);
        }
        DraftCommands::Show { id } => {
            let draft = app
                .drafts
                .drafts()
                .iter()
                .find(|d| d.draft_id == id)
                .with_context(|| format!("No draft with id {id}"))?;
            println!("{}", serde_json::to_string_pretty(draft)?);
        }
        DraftCommands::Delete { id } => {
            if !app.drafts.delete_draft(&id)? {
                bail!("No draft with id {id}");
            }
            println!("Deleted draft {id}.");
        }
        DraftCommands::Submit { id } => {
            if !app.drafts.load_draft(&id)? {
                bail!("No draft with id {id}");
            }
            report_outcome(app.submit_current_draft().await?);
        }
    }
    Ok(())
}
