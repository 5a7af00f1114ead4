//! Response scenarios
//!
//! Each streaming scenario is a fixed [`ChunkSequence`]; the handler only
//! attaches headers. Building the sequence separately keeps the exact bytes
//! and pauses inspectable.

use bytes::Bytes;
use std::path::Path;
use std::time::Duration;
use tracing::error;
use trickle_core::{ChunkSequence, Response, ResponseBuilder, Result, StatusCode};

pub const REFERRER_POLICY: &str = "no-referrer-when-downgrade";

/// Pause after each narrative fragment and before the preload body
pub const CHUNK_DELAY: Duration = Duration::from_millis(2000);

/// Copies of the first fragment written back to back before the narrative
pub const FILLER_REPEAT: usize = 10_000;

pub const SLOW_STREAM_SHELL: &str = "<html><head><title>Slow Stream</title></head><body>";

pub const SLOW_STREAM_PARTS: [&str; 4] = [
    "<h1>Welcome to the Slow Stream</h1>",
    "<p>This content is being sent slowly...</p>",
    "<p>We are simulating a slow network...</p>",
    "<p>Enjoy the stream!</p>",
];

/// Logs FCP and FP once the browser reports them, then keeps the main
/// thread busy for a while.
pub const PAINT_TIMING_SCRIPT: &str = r#"
    <script>
      // first contentful paint
      if ('PerformanceObserver' in window) {
        const observer = new PerformanceObserver((list, observer) => {
          const entries = list.getEntries();
          for (const entry of entries) {
            if (entry.entryType === 'paint' && entry.name === 'first-contentful-paint') {
              console.log('FCP:', entry.startTime, 'ms');
            }
          }
        });
        observer.observe({ type: 'paint', buffered: true });
      }

      // first paint
      if ('PerformanceObserver' in window) {
        const observer = new PerformanceObserver((list, observer) => {
          const entries = list.getEntries();
          for (const entry of entries) {
            if (entry.entryType === 'paint' && entry.name === 'first-paint') {
              console.log('FP:', entry.startTime, 'ms');
            }
          }
        });
        observer.observe({ type: 'paint', buffered: true });
      }

      var a = 0;
      for (let i = 0; i < 100000000; i++) {
        a = a + 1;
      }
      console.log('a:', a);
    </script>
  "#;

pub const SLOW_STREAM_CLOSE: &str = "</body></html>";

pub const SCAN_HEAD: &str = r#"
    <!DOCTYPE html>
    <html lang="en">
    <head>
        <meta charset="UTF-8">
        <meta name="viewport" content="width=device-width, initial-scale=1.0">
        <title>ScanAndPreloadTest</title>
    </head>
    <script>
        for(let i = 0; i < 10000; i++) {
            console.log(i);
        }
    </script>
  "#;

pub const SCAN_BODY: &str = r#"
    <body>
      <img src="https://www.baidu.com/img/flexible/logo/plus_logo_web_2.png" alt="Example Image">
    </body>
    </html>
  "#;

/// `GET /` and `GET /a`
pub fn hello() -> Response {
    Response::html("Hello World!")
}

/// Shell, filler burst, four paced fragments, paint script, closing tags
pub fn slow_stream_sequence() -> ChunkSequence {
    let mut sequence = ChunkSequence::new()
        .write(SLOW_STREAM_SHELL)
        .repeat(SLOW_STREAM_PARTS[0], FILLER_REPEAT);

    for part in SLOW_STREAM_PARTS {
        sequence = sequence.write_then_wait(part, CHUNK_DELAY);
    }

    sequence.write(PAINT_TIMING_SCRIPT).write(SLOW_STREAM_CLOSE)
}

/// Script-heavy head, pause, then a body with a late image
pub fn scan_and_preload_sequence() -> ChunkSequence {
    ChunkSequence::new()
        .write_then_wait(SCAN_HEAD, CHUNK_DELAY)
        .write(SCAN_BODY)
}

/// `GET /stream/slow-stream`
pub fn slow_stream() -> Response {
    streaming_html("slow-stream", slow_stream_sequence())
}

/// `GET /stream/scanAndPreload`
pub fn scan_and_preload() -> Response {
    streaming_html("scanAndPreload", scan_and_preload_sequence())
}

/// `GET /stream/referrer-test`: the on-disk template in one write
pub async fn referrer_test(template: &Path) -> Response {
    match load_template(template).await {
        Ok(html) => html_with_policy().body(html).build(),
        Err(e) => {
            error!(template = %template.display(), error = %e, "failed to read template");
            Response::internal_error("failed to read template")
        }
    }
}

async fn load_template(path: &Path) -> Result<Bytes> {
    Ok(Bytes::from(tokio::fs::read(path).await?))
}

fn html_with_policy() -> ResponseBuilder {
    ResponseBuilder::new(StatusCode::OK)
        .header("Content-Type", "text/html")
        .header("Referrer-Policy", REFERRER_POLICY)
}

fn streaming_html(label: &'static str, sequence: ChunkSequence) -> Response {
    html_with_policy().body(sequence.into_body(label)).build()
}
