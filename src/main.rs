mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use beatshade::analysis::{load_analysis, AudioAnalysis};
use beatshade::audio::decode::decode_audio;
use beatshade::config::{self, Config};
use beatshade::encode::ffmpeg::{EncodeSettings, FfmpegEncoder};
use beatshade::render::backend::GpuBackend;
use beatshade::render::batch::{self, frame_time, total_frames};
use beatshade::render::gpu::GpuContext;
use beatshade::session::{PlaybackClock, PreviewSession, SimulatedClock};
use beatshade::shader::compile::compile_fragment;
use beatshade::shader::fallback::{self, FallbackShader};
use beatshade::shader::pipeline::{ShaderOutcome, ShaderPipeline};
use beatshade::trace::{TraceRecord, TraceWriter};

use cli::{CheckArgs, Cli, Command, PreviewArgs, RenderArgs, ShowArgs};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let cfg = match config::find_config(cli.config.as_deref()) {
        Some(path) => match config::load_config(&path) {
            Some(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            None => {
                log::warn!("Failed to load config from {}", path.display());
                Config::default()
            }
        },
        None => Config::default(),
    };

    match cli.command {
        Command::Render(mut args) => {
            merge_show(&mut args.show, &cfg);
            merge_render(&mut args, &cfg);
            run_render(&args)
        }
        Command::Preview(mut args) => {
            merge_show(&mut args.show, &cfg);
            run_preview(&args, &cfg)
        }
        Command::Check(args) => run_check(&args),
        Command::Fallbacks => {
            println!("Fallback shaders:");
            for shader in fallback::library() {
                let default = if std::ptr::eq(shader, fallback::default_fallback()) {
                    " (default)"
                } else {
                    ""
                };
                println!("  {:<14} {}{}", shader.name, shader.keywords.join(", "), default);
            }
            Ok(())
        }
    }
}

// Config values apply only when the CLI is at its default
fn merge_show(show: &mut ShowArgs, cfg: &Config) {
    if show.width == config::DEFAULT_WIDTH { show.width = cfg.output.width; }
    if show.height == config::DEFAULT_HEIGHT { show.height = cfg.output.height; }
    if show.fps == config::DEFAULT_FPS { show.fps = cfg.output.fps; }
    if show.description.is_none() && !cfg.shader.description.is_empty() {
        show.description = Some(cfg.shader.description.clone());
    }
}

fn merge_render(args: &mut RenderArgs, cfg: &Config) {
    if args.crf == config::DEFAULT_CRF { args.crf = cfg.output.crf; }
    if args.codec == config::DEFAULT_CODEC { args.codec = cfg.output.codec.clone(); }
    if args.pix_fmt == config::DEFAULT_PIX_FMT { args.pix_fmt = cfg.output.pix_fmt.clone(); }
}

fn select_fallback(show: &ShowArgs) -> Result<&'static FallbackShader> {
    match &show.fallback {
        Some(name) => fallback::find(name).with_context(|| {
            format!("Unknown fallback shader '{}' (see `beatshade fallbacks`)", name)
        }),
        None => Ok(fallback::pick_fallback(show.description.as_deref().unwrap_or(""))),
    }
}

/// Loads the analysis and builds a GPU pipeline with the requested shader bound.
fn prepare(show: &ShowArgs) -> Result<(AudioAnalysis, ShaderPipeline<GpuBackend>)> {
    if !show.audio.exists() {
        anyhow::bail!("Input file not found: {}", show.audio.display());
    }
    let analysis = load_analysis(&show.analysis)?;

    let source = match &show.shader {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read shader: {}", path.display()))?,
        ),
        None => None,
    };
    let fallback = select_fallback(show)?;

    let gpu = GpuContext::new()?;
    let max = gpu.max_dimension();
    if show.width > max || show.height > max {
        anyhow::bail!(
            "{}x{} exceeds the GPU's {}px texture limit ({})",
            show.width,
            show.height,
            max,
            gpu.adapter_info.name
        );
    }
    let backend = GpuBackend::new(gpu, show.width, show.height);
    let mut pipeline = ShaderPipeline::new(backend, show.width, show.height)
        .with_fallback(fallback)
        .on_error(|err| eprintln!("Shader error, using fallback instead:\n{}", err));

    match pipeline.set_shader_source(source.as_deref())? {
        ShaderOutcome::Compiled => log::info!("Shader compiled"),
        ShaderOutcome::Fallback { name, .. } => {
            log::info!("Rendering with fallback shader '{}'", name)
        }
    }

    Ok((analysis, pipeline))
}

fn open_trace(path: Option<&Path>) -> Result<Option<TraceWriter<BufWriter<File>>>> {
    path.map(TraceWriter::<BufWriter<File>>::create).transpose()
}

fn run_render(args: &RenderArgs) -> Result<()> {
    let show = &args.show;
    log::info!("beatshade - rendering {}", show.audio.display());
    log::info!("Output: {}", args.output.display());
    log::info!("Resolution: {}x{} @ {}fps", show.width, show.height, show.fps);

    let (analysis, mut pipeline) = prepare(show)?;
    let mut trace = open_trace(show.trace.as_deref())?;

    let settings = EncodeSettings {
        width: show.width,
        height: show.height,
        fps: show.fps,
        codec: args.codec.clone(),
        pix_fmt: args.pix_fmt.clone(),
        crf: args.crf,
        bitrate: args.bitrate.clone(),
    };
    let mut encoder = FfmpegEncoder::new(&args.output, &show.audio, &settings)?;

    batch::render_video(&analysis, &mut pipeline, show.fps, &mut encoder, trace.as_mut())?;

    log::info!("Finalizing video...");
    encoder.finish()?;
    if let Some(trace) = trace {
        trace.finish()?;
    }

    log::info!("Done! Output: {}", args.output.display());
    Ok(())
}

fn run_preview(args: &PreviewArgs, cfg: &Config) -> Result<()> {
    let show = &args.show;
    let (analysis, pipeline) = prepare(show)?;
    let audio = decode_audio(&show.audio)?;
    let mut trace = open_trace(show.trace.as_deref())?;

    let duration = match args.seconds {
        Some(limit) => limit.min(analysis.duration),
        None => analysis.duration,
    };
    let frames = total_frames(duration, show.fps);
    log::info!("Previewing {:.1}s ({} ticks @ {}fps)", duration, frames, show.fps);

    let mut session = PreviewSession::new(analysis, pipeline, cfg.analyser.settings());
    let mut clock = SimulatedClock::new();
    clock.play();

    let pb = ProgressBar::new(frames);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.green/blue} {pos}/{len} ticks")?
            .progress_chars("=>-"),
    );

    let mut beats_hit = 0u64;
    let mut last_beat = -1i64;
    for index in 0..frames {
        let previous = clock.position();
        clock.seek(frame_time(index, show.fps));
        session.feed(audio.span(previous, clock.position()), audio.sample_rate);

        let state = session.tick(&clock)?;
        if state.beat.is_on_beat && state.beat.beat_index != last_beat {
            beats_hit += 1;
            last_beat = state.beat.beat_index;
        }
        if let Some(trace) = trace.as_mut() {
            let record = TraceRecord::new(index, &state, session.pipeline().uniforms())
                .with_hpss(session.analysis().features.hpss_at(state.time));
            trace.write(&record)?;
        }
        pb.set_position(index + 1);
    }
    pb.finish_with_message("Preview complete");

    let pipeline = session.teardown();
    if let Some(trace) = trace {
        trace.finish()?;
    }
    log::info!(
        "Preview finished: {} ticks, {} beats pulsed, shader state {:?}",
        frames,
        beats_hit,
        pipeline.state()
    );
    Ok(())
}

fn run_check(args: &CheckArgs) -> Result<()> {
    let source = std::fs::read_to_string(&args.shader)
        .with_context(|| format!("Failed to read shader: {}", args.shader.display()))?;

    let compiled = compile_fragment(&source)
        .with_context(|| format!("{} does not compile", args.shader.display()))?;

    if args.print_wrapped {
        println!("{}", compiled.wrapped);
    }
    println!(
        "{}: OK ({} functions, wrap contract v{})",
        args.shader.display(),
        compiled.module.functions.len(),
        beatshade::shader::wrap::WRAP_CONTRACT_VERSION
    );
    Ok(())
}
