use anyhow::{Result, bail};

pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect()
}

/// Parse seed tokens. Decimal and `0x` hex are accepted; negative numbers use their magnitude.
pub fn parse_seeds(tokens: &[String]) -> Result<Vec<u64>> {
    let mut seeds = Vec::with_capacity(tokens.len());
    for token in tokens {
        let seed = if let Some(hex) = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
        {
            u64::from_str_radix(hex, 16).ok()
        } else if let Ok(value) = token.parse::<u64>() {
            Some(value)
        } else {
            token.parse::<i64>().ok().map(i64::unsigned_abs)
        };
        match seed {
            Some(seed) if !seeds.contains(&seed) => seeds.push(seed),
            Some(_) => {}
            None => bail!("invalid seed '{token}'"),
        }
    }
    if seeds.is_empty() {
        bail!("no seeds given");
    }
    Ok(seeds)
}
