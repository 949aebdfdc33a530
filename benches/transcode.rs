use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use xmlify_rs::config::InputFormat;
use xmlify_rs::protocol::DeltaSource;
use xmlify_rs::session::StreamSession;
use xmlify_rs::transcoder::build_temporary_json;
use xmlify_rs::{StaticToolRegistry, ToolCallDelta, TranscoderState};

fn sample_write_to_file_arguments(content_bytes: usize) -> String {
    let line = "fn handler(req: &Request) -> Result<Response, Error> {\\n\\tlet body = \\\"ok\\\";\\n}\\n";
    let mut content = String::with_capacity(content_bytes + line.len());
    while content.len() < content_bytes {
        content.push_str(line);
    }
    format!(r#"{{"path":"src/handlers/mod.rs","content":"{content}","create_dirs":true,"mode":420}}"#)
}

fn sample_read_file_arguments(files: usize) -> String {
    let entries = (0..files)
        .map(|idx| format!(r#"{{"path":"src/module_{idx}.rs","line_range":[1,{}]}}"#, 40 + idx))
        .collect::<Vec<_>>()
        .join(",");
    format!(r#"{{"file":[{entries}]}}"#)
}

/// Split on char boundaries into pieces of roughly `size` bytes.
fn split_chunks(text: &str, size: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + size).min(text.len());
        while !text.is_char_boundary(end) {
            end += 1;
        }
        chunks.push(&text[start..end]);
        start = end;
    }
    chunks
}

fn registry() -> Arc<StaticToolRegistry> {
    Arc::new(StaticToolRegistry::new(["write_to_file", "read_file"]))
}

fn bench_transcoder_chunk_sizes(c: &mut Criterion) {
    let arguments = sample_write_to_file_arguments(64 * 1024);
    for size in [4usize, 32, 256, 4096] {
        let chunks = split_chunks(&arguments, size);
        let name = format!("transcoder_write_to_file_64k_chunk_{size}");
        c.bench_function(&name, |b| {
            b.iter(|| {
                let mut state = TranscoderState::new();
                let mut seen = String::with_capacity(arguments.len());
                let mut out = String::with_capacity(arguments.len());
                for chunk in &chunks {
                    seen.push_str(chunk);
                    state.advance_into(black_box(&seen), &mut out);
                }
                out.push_str(&state.finish(&seen));
                black_box(out.len());
            });
        });
    }
}

fn bench_session_batches(c: &mut Criterion) {
    let arguments = sample_read_file_arguments(64);
    for (label, tentative) in [("with_tentative", true), ("without_tentative", false)] {
        let chunks = split_chunks(&arguments, 24);
        let batches: Vec<Vec<ToolCallDelta>> = std::iter::once(vec![ToolCallDelta::new(0)
            .with_id("call_1")
            .with_name("read_file")])
        .chain(
            chunks
                .iter()
                .map(|chunk| vec![ToolCallDelta::new(0).with_arguments(*chunk)]),
        )
        .collect();
        let name = format!("session_read_file_64_files_{label}");
        c.bench_function(&name, |b| {
            b.iter(|| {
                let mut session = StreamSession::with_options(
                    registry(),
                    xmlify_rs::session::SessionOptions {
                        tentative_json: tentative,
                    },
                );
                let mut produced = 0usize;
                for batch in &batches {
                    produced += black_box(session.process_delta_batch(black_box(batch))).xml.len();
                }
                produced += session.finalize().len();
                black_box(produced);
            });
        });
    }
}

fn bench_temporary_json(c: &mut Criterion) {
    let arguments = sample_read_file_arguments(32);
    let cut = arguments.len() * 2 / 3;
    let prefix = &arguments[..cut];
    let mut state = TranscoderState::new();
    state.advance(prefix);
    c.bench_function("temporary_json_read_file_partial", |b| {
        b.iter(|| black_box(build_temporary_json(black_box(prefix), &state)));
    });
}

fn bench_openai_transcript_decode(c: &mut Criterion) {
    let arguments = sample_write_to_file_arguments(8 * 1024);
    let mut transcript = String::new();
    for (idx, chunk) in split_chunks(&arguments, 16).into_iter().enumerate() {
        let delta = if idx == 0 {
            ToolCallDelta::new(0)
                .with_id("call_1")
                .with_name("write_to_file")
                .with_arguments(chunk)
        } else {
            ToolCallDelta::new(0).with_arguments(chunk)
        };
        let payload = serde_json::json!({
            "choices": [{"index": 0, "delta": {"tool_calls": [delta]}}]
        });
        transcript.push_str("data: ");
        transcript.push_str(&payload.to_string());
        transcript.push_str("\n\n");
    }
    transcript.push_str("data: [DONE]\n\n");

    c.bench_function("openai_transcript_8k_end_to_end", |b| {
        b.iter(|| {
            let mut source = DeltaSource::new(InputFormat::Openai);
            let mut session = StreamSession::new(registry());
            let mut produced = 0usize;
            for batch in source.feed(black_box(&transcript)).unwrap_or_default() {
                produced += session.process_delta_batch(&batch).xml.len();
            }
            produced += session.finalize().len();
            black_box(produced);
        });
    });
}

criterion_group!(
    benches,
    bench_transcoder_chunk_sizes,
    bench_session_batches,
    bench_temporary_json,
    bench_openai_transcript_decode
);
criterion_main!(benches);
