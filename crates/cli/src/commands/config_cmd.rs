//! `unidesk config` — Configuration commands.

use unidesk_config::AppConfig;

/// Print a complete default configuration.
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", AppConfig::default_toml());
    Ok(())
}

/// Load the active configuration and report problems.
pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    };

    let mut warnings = Vec::new();
    if !config.has_api_key() {
        warnings.push("No API key set (set UNIDESK_API_KEY or OPENAI_API_KEY)");
    }

    if warnings.is_empty() {
        println!("   All checks passed");
    } else {
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
    }

    println!();
    println!("   Provider:   {}", config.default_provider);
    println!("   Model:      {}", config.default_model);
    println!("   Site:       {}", config.site.url);
    println!("   Retrieval:  {} ({})", config.retrieval.backend, config.retrieval.collection);
    println!("   Sessions:   {}", config.session.backend);
    Ok(())
}

/// Print the active configuration, secrets included as configured.
pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", AppConfig::config_dir().join("config.toml").display());
    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn config_path_is_valid() {
        let path = unidesk_config::AppConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().contains(".unidesk"));
    }
}
