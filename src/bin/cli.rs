use clap::Parser;
use tracing::debug;

use redis_admin::args::join_args;
use redis_admin::config::Args;
use redis_admin::driver::RedisDriver;
use redis_admin::events::{ExecuteParams, Request, Response};
use redis_admin::help;
use redis_admin::reply::ReplyTree;
use redis_admin::Error;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    let mut args = Args::parse_from(std::env::args().skip(1));
    let command = std::mem::take(&mut args.command);
    let config = args.into_config()?;

    let delimiter = config.delimiter.clone();
    let repeat = config.repeat.unwrap_or(1);
    let modes = config.enabled_modes();

    if command.is_empty() && modes.is_empty() {
        println!("{}", help::render(&[]));
        return Ok(());
    }

    let mut driver = RedisDriver::new(config);
    let interrupt = driver.interrupt_handle();
    let signal = interrupt.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal.interrupt();
        }
    });

    driver.connect(Request::new(()), &()).await.into_result()?;

    if !modes.is_empty() {
        let response = driver.process_config_modes(Request::new(()), &()).await;
        return print(response, &delimiter);
    }

    // A negative repeat count runs until interrupted.
    let line = join_args(&command);
    let mut runs = 0;
    while repeat < 0 || runs < repeat {
        let response = driver
            .execute(Request::new(ExecuteParams::user(line.as_str())), &())
            .await;
        print(response, &delimiter)?;
        if interrupt.is_interrupted() {
            break;
        }
        runs += 1;
    }

    Ok(())
}

fn print(response: Response<ReplyTree>, delimiter: &str) -> Result<(), Error> {
    if let Some(tree) = &response.value {
        let text = tree.render(tree.root(), delimiter);
        if !text.is_empty() {
            println!("{}", text);
        }
    }

    match response.error {
        Some(err) if err.is_interrupted() => Ok(()),
        Some(err) => Err(err),
        None => Ok(()),
    }
}
