//! physiq CLI - Command line interface for the analysis API.

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Map, Value};
use tracing_subscriber::EnvFilter;

mod client;
mod error;

use client::{HttpClient, ResultPoll};
use error::ClientError;

/// physiq CLI - submit analyses and poll their results
#[derive(Parser)]
#[command(name = "physiq")]
#[command(about = "CLI for the physiq analysis API", long_about = None)]
struct Cli {
    /// API base URL
    #[arg(long, env = "PHYSIQ_API_URL", default_value = "http://localhost:8080")]
    api_url: String,

    /// Caller identity sent as `x-user-id`
    #[arg(long, env = "PHYSIQ_USER_ID")]
    user_id: Option<String>,

    /// Log requests to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a body photo for analysis
    #[command(name = "submit-body")]
    SubmitBody {
        /// Photo to analyse
        #[arg(long)]
        image: PathBuf,

        #[command(flatten)]
        profile: ProfileArgs,
    },

    /// Submit a meal photo or ingredient list for analysis
    #[command(name = "submit-meal")]
    SubmitMeal {
        /// Photo of the meal
        #[arg(long, conflicts_with = "ingredients", required_unless_present = "ingredients")]
        image: Option<PathBuf>,

        /// Free-text description of what was eaten
        #[arg(long)]
        ingredients: Option<String>,

        #[arg(long)]
        servings: Option<f64>,

        /// breakfast, lunch, dinner, snack or other
        #[arg(long)]
        meal_type: Option<String>,
    },

    /// Get task status and progress
    Status {
        /// Task ID
        id: String,
    },

    /// Get the task result (or its error)
    Result {
        /// Task ID
        id: String,
    },

    /// Poll until the task finishes, then print the result
    Wait {
        /// Task ID
        id: String,

        #[arg(long, default_value_t = 2000)]
        interval_ms: u64,

        #[arg(long, default_value_t = 300)]
        timeout_secs: u64,
    },
}

/// Optional personal details sent with a body analysis.
#[derive(Args, Default)]
struct ProfileArgs {
    #[arg(long)]
    age: Option<f64>,

    #[arg(long)]
    gender: Option<String>,

    /// Height in cm
    #[arg(long)]
    height: Option<f64>,

    /// Weight in kg
    #[arg(long)]
    weight: Option<f64>,

    /// Target weight in kg
    #[arg(long)]
    target_weight: Option<f64>,

    /// sedentary, light, moderate, active or very_active
    #[arg(long)]
    activity: Option<String>,

    /// Repeatable
    #[arg(long = "goal")]
    goals: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let client = HttpClient::new(&cli.api_url, cli.user_id)?;

    match cli.command {
        Commands::SubmitBody { image, profile } => {
            let (data, mime_type) = read_image(&image).await?;
            let body = client.submit("body", &body_request(data, mime_type, profile)).await?;
            print_json(&body)?;
        }
        Commands::SubmitMeal {
            image,
            ingredients,
            servings,
            meal_type,
        } => {
            let image = match image {
                Some(path) => Some(read_image(&path).await?),
                None => None,
            };
            let request = meal_request(image, ingredients, servings, meal_type);
            let body = client.submit("meal", &request).await?;
            print_json(&body)?;
        }
        Commands::Status { id } => {
            print_json(&client.status(&id).await?)?;
        }
        Commands::Result { id } => match client.result(&id).await? {
            ResultPoll::Completed(body) | ResultPoll::Pending(body) => print_json(&body)?,
            ResultPoll::Failed(body) => {
                print_json(&body)?;
                return Err(client::task_failed(&body).into());
            }
        },
        Commands::Wait {
            id,
            interval_ms,
            timeout_secs,
        } => {
            let body = client
                .wait(
                    &id,
                    Duration::from_millis(interval_ms),
                    Duration::from_secs(timeout_secs),
                )
                .await?;
            print_json(&body)?;
        }
    }

    Ok(())
}

fn print_json(value: &Value) -> Result<(), ClientError> {
    let text =
        serde_json::to_string_pretty(value).map_err(|e| ClientError::Serialization(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

async fn read_image(path: &Path) -> Result<(String, &'static str), ClientError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| ClientError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok((STANDARD.encode(bytes), mime_type(path)))
}

fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("heic") => "image/heic",
        _ => "image/jpeg",
    }
}

fn body_request(data: String, mime_type: &str, profile: ProfileArgs) -> Value {
    let mut body = Map::new();
    body.insert("image".into(), json!(data));
    body.insert("mimeType".into(), json!(mime_type));

    let fields = [
        ("age", profile.age.map(|v| json!(v))),
        ("gender", profile.gender.map(|v| json!(v))),
        ("heightCm", profile.height.map(|v| json!(v))),
        ("weightKg", profile.weight.map(|v| json!(v))),
        ("targetWeightKg", profile.target_weight.map(|v| json!(v))),
        ("activityLevel", profile.activity.map(|v| json!(v))),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            body.insert(key.into(), value);
        }
    }
    if !profile.goals.is_empty() {
        body.insert("goals".into(), json!(profile.goals));
    }
    Value::Object(body)
}

fn meal_request(
    image: Option<(String, &'static str)>,
    ingredients: Option<String>,
    servings: Option<f64>,
    meal_type: Option<String>,
) -> Value {
    let mut body = Map::new();
    if let Some((data, mime_type)) = image {
        body.insert("image".into(), json!(data));
        body.insert("mimeType".into(), json!(mime_type));
    }
    if let Some(ingredients) = ingredients {
        body.insert("ingredients".into(), json!(ingredients));
    }
    if let Some(servings) = servings {
        body.insert("servings".into(), json!(servings));
    }
    if let Some(meal_type) = meal_type {
        body.insert("mealType".into(), json!(meal_type));
    }
    Value::Object(body)
}
