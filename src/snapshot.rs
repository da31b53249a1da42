use serde_json::Value;

use crate::features::FeatureError;

/// Fallback values for every profile field we read off a player payload.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotDefaults {
    pub ranking: f64,
    pub birth_timestamp: i64,
    pub prize_total: f64,
    pub height: f64,
    pub weight: f64,
}

pub const DEFAULTS: SnapshotDefaults = SnapshotDefaults {
    ranking: 100.0,
    birth_timestamp: 0,
    prize_total: 0.0,
    height: 1.80,
    weight: 75.0,
};

/// One competitor's profile as reported by the tennis API.
///
/// Built from the raw `team.playerTeamInfo` payload. Fields the API left out
/// resolve to [`DEFAULTS`]; `turned_pro` stays optional because its default
/// depends on the date the features are computed for.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub ranking: f64,
    pub birth_timestamp: i64,
    pub turned_pro: Option<i32>,
    pub prize_total: f64,
    pub height: f64,
    pub weight: f64,
}

impl Default for PlayerSnapshot {
    fn default() -> Self {
        Self {
            ranking: DEFAULTS.ranking,
            birth_timestamp: DEFAULTS.birth_timestamp,
            turned_pro: None,
            prize_total: DEFAULTS.prize_total,
            height: DEFAULTS.height,
            weight: DEFAULTS.weight,
        }
    }
}

impl PlayerSnapshot {
    pub fn from_payload(payload: &Value) -> Result<Self, FeatureError> {
        if !payload.is_object() {
            return Err(FeatureError::Malformed(
                "player payload is not an object".to_string(),
            ));
        }
        let Some(team) = payload.get("team") else {
            return Ok(Self::default());
        };
        if !team.is_object() {
            return Err(FeatureError::Malformed("`team` is not an object".to_string()));
        }
        let Some(info) = team.get("playerTeamInfo") else {
            return Ok(Self::default());
        };
        if !info.is_object() {
            return Err(FeatureError::Malformed(
                "`team.playerTeamInfo` is not an object".to_string(),
            ));
        }

        Ok(Self {
            ranking: info
                .get("currentRanking")
                .and_then(as_f64_any)
                .unwrap_or(DEFAULTS.ranking),
            birth_timestamp: info
                .get("birthDateTimestamp")
                .and_then(as_i64_any)
                .unwrap_or(DEFAULTS.birth_timestamp),
            turned_pro: info
                .get("turnedPro")
                .and_then(as_i64_any)
                .and_then(|y| i32::try_from(y).ok()),
            prize_total: info
                .get("prizeTotal")
                .and_then(as_f64_any)
                .map(|p| p.max(0.0))
                .unwrap_or(DEFAULTS.prize_total),
            height: info
                .get("height")
                .and_then(as_f64_any)
                .unwrap_or(DEFAULTS.height),
            weight: info
                .get("weight")
                .and_then(as_f64_any)
                .unwrap_or(DEFAULTS.weight),
        })
    }
}

// Non-finite values ("NaN", "inf") count as missing.
fn as_f64_any(v: &Value) -> Option<f64> {
    let n = match v.as_f64() {
        Some(n) => n,
        None => v.as_str()?.trim().parse::<f64>().ok()?,
    };
    n.is_finite().then_some(n)
}

fn as_i64_any(v: &Value) -> Option<i64> {
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    if let Some(n) = v.as_f64().filter(|n| n.is_finite()) {
        return Some(n.trunc() as i64);
    }
    v.as_str()?.trim().parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_info_uses_default_table() {
        let snap = PlayerSnapshot::from_payload(&json!({"team": {"playerTeamInfo": {}}})).unwrap();
        assert_eq!(snap, PlayerSnapshot::default());
        assert_eq!(snap.ranking, 100.0);
        assert_eq!(snap.height, 1.80);
        assert_eq!(snap.weight, 75.0);
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let snap = PlayerSnapshot::from_payload(&json!({
            "team": {"playerTeamInfo": {"turnedPro": "2018", "currentRanking": "4"}}
        }))
        .unwrap();
        assert_eq!(snap.turned_pro, Some(2018));
        assert_eq!(snap.ranking, 4.0);
    }

    #[test]
    fn non_finite_and_negative_values_fall_back() {
        let snap = PlayerSnapshot::from_payload(&json!({
            "team": {"playerTeamInfo": {
                "currentRanking": "NaN",
                "height": "inf",
                "weight": "-infinity",
                "prizeTotal": -5
            }}
        }))
        .unwrap();
        assert_eq!(snap.ranking, DEFAULTS.ranking);
        assert_eq!(snap.height, DEFAULTS.height);
        assert_eq!(snap.weight, DEFAULTS.weight);
        assert_eq!(snap.prize_total, 0.0);
    }

    #[test]
    fn missing_team_block_is_not_an_error() {
        let snap = PlayerSnapshot::from_payload(&json!({})).unwrap();
        assert_eq!(snap, PlayerSnapshot::default());
    }

    #[test]
    fn non_object_blocks_are_malformed() {
        assert!(PlayerSnapshot::from_payload(&json!([1, 2])).is_err());
        assert!(PlayerSnapshot::from_payload(&json!({"team": "x"})).is_err());
        assert!(PlayerSnapshot::from_payload(&json!({"team": {"playerTeamInfo": 3}})).is_err());
    }
}
