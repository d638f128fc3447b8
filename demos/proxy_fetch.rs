use std::env;
use std::error::Error;

use sokken::SocksDialer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = env::args().skip(1);
    let proxy = args.next().unwrap_or_else(|| "127.0.0.1:1080".to_string());
    let target = args.next().unwrap_or_else(|| "example.com:80".to_string());

    let dialer = SocksDialer::new(&proxy)?;
    let conn = dialer.dial("tcp", &target).await?;
    let mut stream = conn.into_tcp().expect("a tcp dial yields a tcp stream");

    let host = target
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or(&target);
    stream
        .write_all(format!("GET / HTTP/1.0\r\nHost: {}\r\n\r\n", host).as_bytes())
        .await?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    println!("{}", String::from_utf8_lossy(&response));
    Ok(())
}
