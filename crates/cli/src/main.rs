//! # coursesync-cli: A CLI for `coursesync`
//!
//! Drives an offline client from the command line: download courses for
//! offline study, record progress and quiz attempts, post to the forum, ask the
//! AI tutor, and replay whatever was queued while offline.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use coursesync::types::{
    ForumPostOutcome, NewForumPost, NewForumReply, ProgressUpdate, QuizSubmission,
};
use coursesync::{OfflineClient, SyncConfig};
use std::collections::BTreeMap;
use std::fs::File;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE: &str = "coursesync-cli.log";

// --- CLI Definition ---

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Treat the server as unreachable: every write is queued.
    #[arg(long, global = true)]
    offline: bool,
    /// Overrides the offline database location.
    #[arg(long, global = true, env = "COURSESYNC_DB_PATH")]
    db_path: Option<String>,
    /// Overrides the learning platform's base URL.
    #[arg(long, global = true, env = "COURSESYNC_API_BASE_URL")]
    api_url: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download a course for offline use
    Download { course_id: String },
    /// Report how much of a course is available offline
    Verify { course_id: String },
    /// Record progress through a course or lesson
    Progress(ProgressArgs),
    /// Submit a quiz attempt
    Quiz(QuizArgs),
    /// Work with the course forum
    Forum {
        #[command(subcommand)]
        command: ForumCommands,
    },
    /// Ask the AI tutor
    Ask(AskArgs),
    /// Replay queued mutations against the server
    Sync {
        /// Keep running and drain on every reconnect.
        #[arg(long)]
        watch: bool,
        /// Seconds between reachability checks in watch mode.
        #[arg(long, default_value_t = 30)]
        check_secs: u64,
    },
    /// Show connectivity, queued mutations and downloaded courses
    Status {
        /// Print the payload of every queued mutation.
        #[arg(long)]
        verbose: bool,
    },
    /// Delete every cached row, queued mutation and media file
    Clear,
}

#[derive(Parser, Debug)]
struct ProgressArgs {
    #[arg(long)]
    user: String,
    #[arg(long)]
    course: String,
    #[arg(long)]
    lesson: Option<String>,
    #[arg(long, default_value_t = 0.0)]
    percent: f64,
    /// Cumulative seconds spent.
    #[arg(long, default_value_t = 0)]
    time_spent: u64,
    #[arg(long)]
    completed: bool,
}

#[derive(Parser, Debug)]
struct QuizArgs {
    #[arg(long)]
    user: String,
    #[arg(long)]
    quiz: String,
    /// An answer as `question_id=option_index`. Repeatable.
    #[arg(long = "answer", value_parser = parse_answer)]
    answers: Vec<(String, usize)>,
    #[arg(long, default_value_t = 0.0)]
    score: f64,
}

#[derive(Subcommand, Debug)]
enum ForumCommands {
    /// Create a post
    Post {
        #[arg(long)]
        user: String,
        #[arg(long)]
        course: Option<String>,
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
    },
    /// Reply to a post
    Reply {
        #[arg(long)]
        post: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        content: String,
    },
    /// List cached posts
    List {
        #[arg(long)]
        course: Option<String>,
    },
}

#[derive(Parser, Debug)]
struct AskArgs {
    query: String,
    #[arg(long)]
    course: Option<String>,
    #[arg(long)]
    lesson: Option<String>,
}

fn parse_answer(raw: &str) -> Result<(String, usize), String> {
    let (question, option) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected question_id=option_index, got '{raw}'"))?;
    let option = option
        .trim()
        .parse::<usize>()
        .map_err(|e| format!("invalid option index in '{raw}': {e}"))?;
    Ok((question.trim().to_string(), option))
}

// --- Main Application Entry ---

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging to a file
    let log_file = File::create(LOG_FILE)?;
    let subscriber = fmt::Subscriber::builder()
        .with_writer(log_file)
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Command failed: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = SyncConfig::load()?;
    if let Some(db_path) = cli.db_path {
        config.db_path = db_path;
    }
    if let Some(api_url) = cli.api_url {
        config.api_base_url = api_url;
    }
    if cli.offline {
        config.start_online = false;
    }
    info!(?config, "Starting coursesync CLI.");

    let client = OfflineClient::from_config(&config).await?;
    if client.store.is_inert() {
        eprintln!("Warning: the offline database is unavailable; nothing will be persisted.");
    }

    match cli.command {
        Commands::Download { course_id } => handle_download(&client, &course_id).await,
        Commands::Verify { course_id } => handle_verify(&client, &course_id).await,
        Commands::Progress(args) => handle_progress(&client, args).await,
        Commands::Quiz(args) => handle_quiz(&client, args).await,
        Commands::Forum { command } => handle_forum(&client, command).await,
        Commands::Ask(args) => {
            let answer = client
                .ai
                .query(&args.query, args.course.as_deref(), args.lesson.as_deref())
                .await;
            println!("{answer}");
            Ok(())
        }
        Commands::Sync { watch, check_secs } => {
            if watch {
                handle_sync_watch(&client, cli.offline, Duration::from_secs(check_secs)).await
            } else {
                handle_sync(&client, cli.offline).await
            }
        }
        Commands::Status { verbose } => handle_status(&client, cli.offline, verbose).await,
        Commands::Clear => {
            client.clear_cache().await?;
            println!("Offline cache cleared.");
            Ok(())
        }
    }
}

// --- Command Handlers ---

async fn handle_download(client: &OfflineClient, course_id: &str) -> Result<()> {
    let report = client.downloader.download_course(course_id).await?;
    println!(
        "Downloaded course '{}': {} lessons, {} quizzes, {} media files.",
        report.course_id, report.lessons_cached, report.quizzes_cached, report.media_cached
    );
    if report.used_embedded_lessons {
        println!("  Lessons were taken from the course metadata.");
    }
    if report.placeholder_quiz {
        println!("  No quizzes are published; a practice quiz was added.");
    }
    if report.media_failed > 0 {
        println!("  {} media files could not be downloaded.", report.media_failed);
    }
    for warning in &report.warnings {
        println!("  Warning: {warning}");
    }
    Ok(())
}

async fn handle_verify(client: &OfflineClient, course_id: &str) -> Result<()> {
    let verification = client.downloader.verify_course_download(course_id).await?;
    if !verification.exists {
        println!("Course '{course_id}' is not downloaded.");
        return Ok(());
    }
    let usability = if verification.is_fully_usable() {
        "fully usable offline"
    } else {
        "metadata only"
    };
    println!(
        "Course '{course_id}': {} lessons, {} quizzes ({usability}).",
        verification.lessons_count, verification.quizzes_count
    );
    Ok(())
}

async fn handle_progress(client: &OfflineClient, args: ProgressArgs) -> Result<()> {
    let record = client
        .sync
        .save_progress(ProgressUpdate {
            user_id: args.user,
            course_id: args.course,
            lesson_id: args.lesson,
            completed: args.completed,
            percent: args.percent,
            time_spent: args.time_spent,
        })
        .await?;
    println!("Progress saved ({}).", sync_state(record.synced));
    Ok(())
}

async fn handle_quiz(client: &OfflineClient, args: QuizArgs) -> Result<()> {
    let attempt = client
        .sync
        .submit_quiz_attempt(QuizSubmission {
            user_id: args.user,
            quiz_id: args.quiz,
            answers: args.answers.into_iter().collect::<BTreeMap<_, _>>(),
            score: args.score,
        })
        .await?;
    println!("Quiz attempt {} saved ({}).", attempt.id, sync_state(attempt.synced));
    Ok(())
}

async fn handle_forum(client: &OfflineClient, command: ForumCommands) -> Result<()> {
    match command {
        ForumCommands::Post {
            user,
            course,
            title,
            content,
        } => {
            let outcome = client
                .sync
                .create_forum_post(NewForumPost {
                    user_id: user,
                    course_id: course,
                    title,
                    content,
                })
                .await?;
            match outcome {
                ForumPostOutcome::Created(post) => {
                    println!("Post {} created ({}).", post.id, sync_state(post.synced))
                }
                ForumPostOutcome::Duplicate(post) => {
                    println!("Post {} is already waiting to be sent.", post.id)
                }
            }
        }
        ForumCommands::Reply {
            post,
            user,
            content,
        } => {
            let reply = client
                .sync
                .add_forum_reply(NewForumReply {
                    post_id: post,
                    user_id: user,
                    content,
                })
                .await?;
            println!("Reply {} saved locally.", reply.id);
        }
        ForumCommands::List { course } => {
            let posts = client.sync.get_forum_posts(course.as_deref()).await?;
            if posts.is_empty() {
                println!("No cached posts.");
            }
            for post in posts {
                println!(
                    "[{}] {} by {} ({} replies, {})",
                    post.id,
                    post.title,
                    post.user_id,
                    post.replies.len(),
                    sync_state(post.synced)
                );
            }
        }
    }
    Ok(())
}

async fn handle_sync(client: &OfflineClient, offline: bool) -> Result<()> {
    if !offline && !client.refresh_connectivity().await {
        println!("Server unreachable; queued mutations are kept.");
    }
    let report = client.sync.sync_pending_data().await?;
    if report.skipped {
        println!(
            "Sync skipped, {} mutations remain queued.",
            client.sync.pending_count().await?
        );
        return Ok(());
    }
    println!(
        "Synced {} of {} queued mutations ({} will be retried, {} given up).",
        report.synced, report.attempted, report.retried, report.abandoned
    );
    Ok(())
}

async fn handle_sync_watch(client: &OfflineClient, offline: bool, check_every: Duration) -> Result<()> {
    let _tasks = client.start();
    handle_sync(client, offline).await?;
    println!("Watching for reconnects. Press Ctrl-C to stop.");

    let mut ticker = tokio::time::interval(check_every);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                if !offline {
                    client.refresh_connectivity().await;
                }
            }
        }
    }
    println!(
        "Stopped with {} mutations queued.",
        client.sync.pending_count().await?
    );
    Ok(())
}

async fn handle_status(client: &OfflineClient, offline: bool, verbose: bool) -> Result<()> {
    let online = !offline && client.refresh_connectivity().await;
    println!("Connectivity: {}", if online { "online" } else { "offline" });

    let items = client.sync.outbox_items().await?;
    println!("Queued mutations: {}", items.len());
    if verbose {
        for item in &items {
            let payload = serde_json::to_string(&item.payload)
                .map_err(|e| anyhow!("unprintable payload for {}: {e}", item.id))?;
            println!(
                "  #{} {} (retries: {}) {payload}",
                item.seq, item.kind, item.retry_count
            );
        }
    }

    let courses = client.downloader.downloaded_courses().await?;
    println!("Downloaded courses: {}", courses.len());
    for course in courses {
        println!(
            "  {} - {} ({} lessons, {} quizzes)",
            course.id,
            course.title,
            course.lessons.len(),
            course.quizzes.len()
        );
    }
    Ok(())
}

fn sync_state(synced: bool) -> &'static str {
    if synced {
        "synced"
    } else {
        "queued for sync"
    }
}
