use clap::{Parser, Subcommand};
use reqwest::Client;
use serde_json::json;
use std::error::Error;

#[derive(Parser)]
#[command(name = "tracewatch-cli")]
#[command(about = "Operator CLI for the tracewatch Control Surface", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080", env = "TRACEWATCH_ENDPOINT")]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server and monitored-service health
    Health,

    /// List SpanBaselines, sorted by sample count
    Baselines,

    /// List active anomalies
    Anomalies,

    /// Fetch anomaly/hourly-trend history
    History {
        #[arg(long)]
        hours: Option<u32>,
        #[arg(long)]
        service: Option<String>,
    },

    /// Run a one-shot or cached analysis for a trace
    Analyze {
        #[arg(long)]
        trace_id: String,
        #[arg(long)]
        anomaly_id: Option<String>,
    },

    /// Trigger a time-baseline recalculation
    Recalculate {
        #[arg(long)]
        full: bool,
    },

    /// List TimeBaselines and recalculation status
    TimeBaselines,

    /// Correlate an anomaly or service/timestamp pair against platform metrics
    Correlate {
        #[arg(long)]
        anomaly_id: Option<String>,
        #[arg(long)]
        service: String,
        #[arg(long)]
        timestamp: String,
    },

    /// Summarize registered Prometheus metrics
    MetricsSummary,

    /// Rate an LLM analysis for the training feedback loop
    RateExample {
        #[arg(long)]
        anomaly_id: String,
        #[arg(long, value_enum)]
        rating: RatingArg,
        #[arg(long)]
        correction: Option<String>,
    },

    /// List recorded training examples
    TrainingList,
}

#[derive(Clone, clap::ValueEnum)]
enum RatingArg {
    Good,
    Bad,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let client = Client::new();

    match cli.command {
        Commands::Health => {
            let body: serde_json::Value = client.get(format!("{}/health", cli.endpoint)).send().await?.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Commands::Baselines => {
            let body: serde_json::Value = client.get(format!("{}/baselines", cli.endpoint)).send().await?.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Commands::Anomalies => {
            let body: serde_json::Value = client.get(format!("{}/anomalies", cli.endpoint)).send().await?.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Commands::History { hours, service } => {
            let mut url = format!("{}/history?", cli.endpoint);
            if let Some(h) = hours {
                url.push_str(&format!("hours={h}&"));
            }
            if let Some(s) = service {
                url.push_str(&format!("service={s}&"));
            }
            let body: serde_json::Value = client.get(&url).send().await?.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Commands::Analyze { trace_id, anomaly_id } => {
            let mut url = format!("{}/analyze?trace_id={}", cli.endpoint, trace_id);
            if let Some(id) = anomaly_id {
                url.push_str(&format!("&anomaly_id={id}"));
            }
            let body: serde_json::Value = client.get(&url).send().await?.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Commands::Recalculate { full } => {
            let body: serde_json::Value = client
                .post(format!("{}/recalculate", cli.endpoint))
                .json(&json!({ "full": full }))
                .send()
                .await?
                .json()
                .await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Commands::TimeBaselines => {
            let body: serde_json::Value = client.get(format!("{}/time-baselines", cli.endpoint)).send().await?.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Commands::Correlate { anomaly_id, service, timestamp } => {
            let mut url = format!("{}/correlate?service={}&timestamp={}", cli.endpoint, service, timestamp);
            if let Some(id) = anomaly_id {
                url.push_str(&format!("&anomaly_id={id}"));
            }
            let body: serde_json::Value = client.get(&url).send().await?.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Commands::MetricsSummary => {
            let body: serde_json::Value = client.get(format!("{}/metrics/summary", cli.endpoint)).send().await?.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Commands::RateExample { anomaly_id, rating, correction } => {
            let rating = match rating {
                RatingArg::Good => "good",
                RatingArg::Bad => "bad",
            };
            eprintln!(
                "note: rating an example requires the full anomaly/prompt/completion payload; \
                 this convenience form only carries the id, rating, and optional correction"
            );
            let body: serde_json::Value = client
                .post(format!("{}/training/examples", cli.endpoint))
                .json(&json!({ "anomalyId": anomaly_id, "rating": rating, "correction": correction }))
                .send()
                .await?
                .json()
                .await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Commands::TrainingList => {
            let body: serde_json::Value = client.get(format!("{}/training/examples", cli.endpoint)).send().await?.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }

    Ok(())
}
