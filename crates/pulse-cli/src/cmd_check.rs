use pulse_supervisor::{PulseApi, SupervisorConfig};

/// Print availability for `provider`. Returns whether it is usable.
pub async fn execute(config: SupervisorConfig, provider: &str) -> anyhow::Result<bool> {
    let api = PulseApi::new(config);
    let result = api.check_tool_availability(provider).await;
    if result.available {
        println!("✓ {}", result.message);
        if let Some(path) = &result.path {
            println!("  {}", path.display());
        }
    } else {
        println!("✗ {}", result.message);
    }
    Ok(result.available)
}
