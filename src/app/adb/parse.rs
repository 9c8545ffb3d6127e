use regex::Regex;

fn capture_pair(re: &Regex, output: &str) -> Option<(u32, u32)> {
    let caps = re.captures(output)?;
    let width = caps[1].parse::<u32>().ok()?;
    let height = caps[2].parse::<u32>().ok()?;
    Some((width, height))
}

/// Parses `wm size` output. `Override size` takes precedence over `Physical size`.
pub fn parse_wm_size(output: &str) -> Option<(u32, u32)> {
    let physical_re = Regex::new(r"Physical size:\s*(\d+)x(\d+)").ok()?;
    let override_re = Regex::new(r"Override size:\s*(\d+)x(\d+)").ok()?;
    capture_pair(&override_re, output).or_else(|| capture_pair(&physical_re, output))
}

/// Parses `wm density` output, reading the physical density only.
pub fn parse_wm_density(output: &str) -> Option<u32> {
    let density_re = Regex::new(r"Physical density:\s*(\d+)").ok()?;
    density_re
        .captures(output)
        .and_then(|caps| caps[1].parse::<u32>().ok())
}
