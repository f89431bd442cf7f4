use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use histo_volume::{
    ImageEncoder, PipelineError, SlideFileOpener, SlidePipeline, WGPU,
    config::{Cli, Command, ExtractConfig, RenderConfig},
    enums::Compositing,
    pipeline::EncodedRegion,
    raycaster::{EntryExitImages, RaycastCompositor, RaycastInputs},
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let verbose = match &cli.command {
        Command::Extract(config) => config.region.verbose,
        Command::Render(config) => config.region.verbose,
    };
    init_logging(verbose);

    let validated = match &cli.command {
        Command::Extract(config) => config.validate(),
        Command::Render(config) => config.validate(),
    };
    if let Err(e) = validated {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Command::Extract(config) => run_extract(config),
        Command::Render(config) => run_render(config).await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_extract(config: ExtractConfig) -> Result<(), PipelineError> {
    let region = &config.region;
    let pipeline = SlidePipeline::new(SlideFileOpener::default())
        .with_encoder(ImageEncoder::new(region.quality))
        .with_repeat(region.repeat);
    let plan = pipeline.export(
        &region.slide,
        region.view(),
        region.selection(),
        &config.output,
        &config.manifest,
    )?;
    info!(
        "Level {} of {}, region {}x{} at level-0 ({}, {})",
        plan.level,
        plan.bounds.max_level,
        plan.width,
        plan.height,
        plan.origin_level0.0,
        plan.origin_level0.1
    );
    info!("Manifest written to {}", config.manifest.display());
    Ok(())
}

async fn run_render(config: RenderConfig) -> Result<(), PipelineError> {
    let region = &config.region;
    let pipeline = SlidePipeline::new(SlideFileOpener::default())
        .with_encoder(ImageEncoder::new(region.quality))
        .with_repeat(region.repeat)
        .with_spacing(config.spacing)
        .with_skip_unsupported(config.skip_unsupported);
    let encoded: EncodedRegion =
        pipeline.extract_region(&region.slide, region.view(), region.selection())?;
    let volume = Arc::new(pipeline.assemble(&encoded)?);

    let wgpu = WGPU::request().await?;
    let mut compositor = RaycastCompositor::new(wgpu);
    if !config.colors.is_empty() {
        compositor.set_colors_hex(&config.colors[..])?;
    }
    let compositing = Compositing::from(config.compositing);
    compositor.set_shading_mode(config.shading.into());
    compositor.update_settings(|s| s.raycasting.compositing = compositing);
    compositor.on_volume_changed(&volume);
    if !compositor.select_channel(config.channel) {
        info!(
            "Channel {} not available, volume has {}",
            config.channel,
            compositor.channel().len()
        );
    }

    let inputs = RaycastInputs::new(EntryExitImages::orthographic(config.width, config.height));
    if !compositor.process(volume, &inputs).await? {
        info!("Volume was superseded before rendering");
        return Ok(());
    }
    let image = compositor.read_output().await?;
    image
        .save(&config.output)
        .map_err(|e| PipelineError::Image {
            path: config.output.clone(),
            message: e.to_string(),
        })?;
    info!("Rendered {}", config.output.display());
    Ok(())
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "histo_volume=debug,wgpu_core=warn"
    } else {
        "histo_volume=info,wgpu_core=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
