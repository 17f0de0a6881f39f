use crate::utils::Locate;
use colored::Colorize;

pub fn handle(locate: &Locate) -> anyhow::Result<()> {
    println!("{}", "Validating wanna.yaml...".blue());

    let wanna_file = match locate.wanna_file() {
        Ok(path) => path,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ wanna.yaml not found".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };
    println!("File: {}", wanna_file.display().to_string().cyan());

    match locate.load_project() {
        Ok((_, project)) => {
            let config = &project.config;
            println!("{}", "✓ Configuration is valid".green().bold());
            println!();
            println!("Summary:");
            println!(
                "  project: {} (version {})",
                config.wanna_project.name.cyan(),
                config.wanna_project.version
            );
            println!(
                "  profile: {} ({}, {})",
                project.profile.profile_name.cyan(),
                project.profile.project_id,
                project.profile.region
            );
            if let Some(docker) = &config.docker {
                println!("  images: {}", docker.images.len());
                for image in &docker.images {
                    println!("    - {} ({})", image.name.cyan(), image.build.variant_name());
                }
            }
            println!("  jobs: {}", config.jobs.len());
            for job in &config.jobs {
                println!("    - {} ({})", job.name.cyan(), job.worker.docker_image_ref);
            }
            println!("  pipelines: {}", config.pipelines.len());
            for pipeline in &config.pipelines {
                let schedule = pipeline
                    .schedule
                    .as_ref()
                    .map(|s| format!(", schedule {}", s.cron))
                    .unwrap_or_default();
                println!(
                    "    - {} ({}{})",
                    pipeline.name.cyan(),
                    pipeline.pipeline_file.display(),
                    schedule
                );
            }
            println!("  notebooks: {}", config.notebooks.len());
            println!("  tensorboards: {}", config.tensorboards.len());
            println!(
                "  notification channels: {}",
                config.notification_channels.len()
            );
        }
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Configuration error".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
