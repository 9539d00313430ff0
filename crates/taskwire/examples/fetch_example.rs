/*
[INPUT]:  Public HTTP endpoint (httpbin-compatible)
[OUTPUT]: Decoded JSON response, a downloaded file
[POS]:    Examples - data and download tasks
[UPDATE]: When the public task API changes
*/

use indexmap::IndexMap;
use taskwire::*;

/// Example: one data task with query parameters, then a download.
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("taskwire=info"))
        .init();

    let config = SessionConfig {
        base_url: url::Url::parse("https://httpbin.org/").ok(),
        ..SessionConfig::default()
    };
    let manager = match SessionManager::new(config) {
        Ok(manager) => manager,
        Err(e) => {
            eprintln!("Failed to create manager: {}", e);
            return;
        }
    };

    let mut parameters = IndexMap::new();
    parameters.insert("symbol".to_string(), Parameter::from("BTC-USD"));
    parameters.insert("levels".to_string(), Parameter::from(vec![1, 5, 10]));

    println!("Fetching /get with query parameters...");
    let task = match manager.task(
        HttpMethod::Get,
        "get",
        Some(&parameters),
        &ParameterEncoding::RawQuery,
        None,
    ) {
        Ok(task) => task,
        Err(e) => {
            eprintln!("✗ Could not create task: {}", e);
            return;
        }
    };
    match task
        .response_async(Transform::<serde_json::Value>::json(JsonOptions::default()))
        .await
    {
        Ok(response) => match (response.value, response.error) {
            (Some(value), None) => println!("✓ Echoed args: {}", value["args"]),
            (_, Some(error)) => println!("✗ Task failed: {}", error),
            (None, None) => println!("✗ Empty response: {:?}", response.transform_error),
        },
        Err(e) => println!("✗ Error: {}", e),
    }

    println!("\nDownloading /bytes/4096...");
    let destination = std::env::temp_dir().join("taskwire-example.bin");
    let target = destination.clone();
    let request = match url::Url::parse("https://httpbin.org/bytes/4096") {
        Ok(url) => reqwest::Request::new(reqwest::Method::GET, url),
        Err(e) => {
            eprintln!("✗ Bad URL: {}", e);
            return;
        }
    };
    match manager.download(request, move |_, _| target.clone()) {
        Ok(task) => {
            task.on_progress(|_, written, expected| {
                println!("  {} / {:?} bytes", written, expected);
            });
            task.finished().await;
            match task.error() {
                None => println!("✓ Saved to {}", destination.display()),
                Some(error) => println!("✗ Download failed: {}", error),
            }
        }
        Err(e) => println!("✗ Error: {}", e),
    }

    println!("\n✓ Fetch example complete");
}
