use cinecraft::catalog::classify_devices;
use cinecraft::testing::SimulatedBackend;
use cinecraft::types::RawDeviceInfo;
use cinecraft::{CameraService, CineCraftConfig, DeviceCatalog, MediaBackend};
use std::env;
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    cinecraft::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: cinecraft-cli <list-devices|classify|demo> [args] [--native]");
        std::process::exit(1);
    }

    let command = &args[1];
    match command.as_str() {
        "list-devices" => cmd_list_devices(&args),
        "classify" => cmd_classify(&args),
        "demo" => cmd_demo(&args),
        _ => {
            eprintln!("Unknown command: {}", command);
            std::process::exit(1);
        }
    }
}

fn backend(args: &[String]) -> Result<Arc<dyn MediaBackend>, Box<dyn std::error::Error>> {
    if !args.iter().any(|a| a == "--native") {
        return Ok(Arc::new(SimulatedBackend::phone()));
    }

    #[cfg(feature = "native")]
    {
        Ok(Arc::new(cinecraft::platform::native::NativeBackend::new()))
    }

    #[cfg(not(feature = "native"))]
    {
        Err("built without the `native` feature".into())
    }
}

fn cmd_list_devices(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let backend = backend(args)?;
    let runtime = tokio::runtime::Runtime::new()?;

    let config = CineCraftConfig::load_or_default();
    let catalog = DeviceCatalog::new(backend, config.camera.facing);
    let (devices, mics) = runtime.block_on(async {
        let devices = catalog.enumerate().await?;
        let mics = catalog.enumerate_audio().await?;
        Ok::<_, cinecraft::CameraError>((devices, mics))
    })?;

    if args.contains(&"--json".to_string()) {
        let listing = serde_json::json!({ "cameras": devices, "microphones": mics });
        println!("{}", serde_json::to_string(&listing)?);
    } else {
        for d in devices {
            println!("{}: {} [{}]", d.id, d.display_label, d.role);
        }
        for m in mics {
            println!("{}: {} [{} mic]", m.id, m.label, m.kind.as_str());
        }
    }
    Ok(())
}

fn cmd_classify(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let labels: Vec<&String> = args[2..].iter().filter(|a| !a.starts_with("--")).collect();
    if labels.is_empty() {
        eprintln!("Usage: cinecraft-cli classify <label>...");
        std::process::exit(1);
    }

    let raw: Vec<RawDeviceInfo> = labels
        .iter()
        .enumerate()
        .map(|(i, label)| RawDeviceInfo::video(format!("arg{}", i), label.as_str()))
        .collect();

    let devices = classify_devices(&raw);
    if args.contains(&"--json".to_string()) {
        println!("{}", serde_json::to_string(&devices)?);
    } else {
        if devices.len() < raw.len() {
            println!("({} front-facing label(s) skipped)", raw.len() - devices.len());
        }
        for d in devices {
            println!("{:<10} {}", d.role.as_str(), d.display_label);
        }
    }
    Ok(())
}

fn cmd_demo(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let output = args
        .get(2)
        .filter(|a| !a.starts_with("--"))
        .ok_or("Usage: cinecraft-cli demo <output-dir> [--native]")?;

    let mut config = CineCraftConfig::load_or_default();
    config.storage.output_directory = output.clone();
    config.zoom.surface_resolution = [640, 360];

    let service = CameraService::with_filesystem_store(backend(args)?, config)?;
    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async {
        let session = service.initialize().await?;
        println!("Camera ready on {} ({})", session.bound_device_id, session.resolution());

        let photo = service.take_photo().await?;
        println!("Photo: {}", photo.saved.path.display());

        let zoom = service.set_zoom(3.0).await?;
        println!("Zoom {:.1}x ({:?})", zoom.state.level, zoom.state.mode);
        if let Some(lens) = zoom.switched_to {
            println!("Switched to {} lens", lens.role);
        }

        let info = service.start_recording().await?;
        println!("Recording {} as {}", info.id, info.mime_type);
        tokio::time::sleep(Duration::from_millis(750)).await;
        let video = service.stop_recording().await?;
        println!("Video: {} ({} bytes)", video.saved.path.display(), video.saved.bytes);

        service.shutdown().await?;
        Ok::<_, cinecraft::CameraError>(())
    })?;

    Ok(())
}
