// Prompt and response-schema construction for the track analysis model.
// The model does all the analysis; this only describes the task and the context.

use serde_json::{json, Value};

use crate::types::*;

/// Full instruction text for one analysis request.
pub fn build_prompt(context: &AnalysisContext, markers: &[Marker], media_kind: MediaKind) -> String {
    let sections = [
        "You are a world-class race engineer specialising in telemetry and circuit analysis. \
         Analyse the provided track media in as much detail as possible."
            .to_string(),
        weather_guidance(context.weather).to_string(),
        vehicle_guidance(context.vehicle).to_string(),
        track_info(context),
        lap_time_instruction(context),
        match media_kind {
            MediaKind::Image => marker_instruction(markers),
            MediaKind::Video => video_instruction(context.video_scope).to_string(),
        },
        output_rules(context).to_string(),
    ];

    sections
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| s.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn weather_guidance(weather: Weather) -> &'static str {
    match weather {
        Weather::Dry => {
            "Conditions: DRY. Give optimal-performance advice for standard dry running on slicks."
        }
        Weather::Wet => {
            "Conditions: WET. Adapt all advice to wet driving: brake earlier and more smoothly, \
             avoid the rubbered-in dry line (use the rain line), and expect lap times 10-15% or \
             more slower than in the dry."
        }
    }
}

fn vehicle_guidance(vehicle: Vehicle) -> &'static str {
    match vehicle {
        Vehicle::F1 => {
            "Vehicle: Formula 1. ~1000hp, 798kg, top speed >330km/h, 5-6G cornering, very high \
             downforce, carbon brakes, DRS (+15-20km/h on straights) and ERS deployment (160hp MGU-K).\n\
             Reference setup ranges: front wing 10-18deg (Monza) / 28-35deg (Spa, Suzuka) / 45-50deg+ (Monaco); \
             ride height front 4-6mm, rear 5-7mm; tire pressure front 22-24psi, rear 20-22psi (hot); \
             springs front 200-250N/mm, rear 160-200N/mm (stiff); high-speed bump stiff, low-speed rebound medium; \
             ARB front hard, rear soft.\n\
             Average speed 230-250km/h in the dry. Braking: very heavy initial bite, bleed off as downforce \
             drops (trail braking). Use real F1 records for known circuits."
        }
        Vehicle::FormulaE => {
            "Vehicle: Formula E (Gen3). 350kW, ~850kg, top speed ~320km/h, all-weather low-grip tires, \
             open differential with no lock adjustment, strong rear regenerative braking.\n\
             Reference setup ranges: ride height 60-80mm; tire pressure 1.3-1.6bar; springs front 90-110N/mm, \
             rear 80-100N/mm (soft); soft compression, fast rebound; regen front 250kW, rear 350kW; \
             brake bias rearwards.\n\
             Lap times 20-25% slower than F1. Average speed 130-150km/h (mostly street circuits). \
             Braking: lift and coast, earlier than F1, rely on regen. Use the pit strategy field for \
             energy and regen strategy."
        }
        Vehicle::GT3 => {
            "Vehicle: GT3 (e.g. 911 GT3 R, AMG GT3). ~520-560hp, ~1250kg, top speed ~280km/h, \
             ABS and TC adjustable 0-11 from the cockpit.\n\
             Reference setup ranges: rear wing 1-12deg; ride height front 55-65mm, rear 65-80mm; \
             springs front 180-220N/mm, rear 190-230N/mm; bump 5-8/10, rebound 4-7/10; \
             ABS dry 3-5, wet 6-9; TC exit 2-4, tire saving 5-7; tire pressure 2.0-2.1bar hot.\n\
             20-30s slower than F1 per lap. Average speed 160-180km/h. Braking: longer distances, \
             lean on ABS and weight transfer into the corner."
        }
        Vehicle::Karting => {
            "Vehicle: competition kart (125cc 2-stroke, OK/KZ). 30-45hp, ~150kg, top speed 100-140km/h, \
             no suspension, solid rear axle.\n\
             Reference setup ranges: front torsion bar soft/medium/stiff, rear axle medium/hard; \
             1-2 seat stays per side; rear track 1380-1400mm; front track by spacers; \
             tire pressure 0.6-1.0bar; sprocket 11/78 (acceleration) to 12/75 (top speed).\n\
             Kart circuits only. Average speed 80-100km/h. Braking: rear brake only (except KZ), \
             sharp stab to rotate the rear into the corner."
        }
        Vehicle::RoadCar => {
            "Vehicle: high-performance road car. 400-700hp, >1400kg, street tires.\n\
             Reference setup ranges: tire pressure cold 28-30psi, hot 34-36psi (never above 38psi); \
             springs front 40-80N/mm, rear 50-90N/mm; medium compression, slow/stiff rebound \
             (Track/Corsa mode for adaptive dampers); coilovers front 10-12kg, rear 8-10kg; \
             endurance track pads.\n\
             Much slower than GT3; soft suspension, large roll, brakes and tires overheat easily. \
             Average speed 110-130km/h. Braking: very early, manage heat."
        }
    }
}

fn track_info(context: &AnalysisContext) -> String {
    let mut info = String::new();
    let name = context.track_name.trim();
    if !name.is_empty() {
        info.push_str(&format!(
            "The user says this circuit is \"{}\". Prefer real data for this circuit.\n",
            name
        ));
    }
    if let Some(metres) = track_length_metres(context) {
        info.push_str(&format!(
            "The user says the track length is {} m ({:.2} km).",
            metres,
            metres / 1000.0
        ));
    }
    info
}

fn lap_time_instruction(context: &AnalysisContext) -> String {
    match track_length_metres(context) {
        Some(metres) => {
            let km = metres / 1000.0;
            format!(
                "Lap time check: the track is {km:.2} km. Verify your estimate with \
                 Time = Distance / Speed using the average speeds above. For example, at 230 km/h \
                 the lap would take about ({km:.2} / 230) * 60 minutes. Do the arithmetic; do not guess."
            )
        }
        None => "The track length was not given. Try to identify the circuit; if you cannot, \
                 estimate a plausible length and lap time from the corner density and straight \
                 proportions. Never give physically impossible numbers."
            .to_string(),
    }
}

fn track_length_metres(context: &AnalysisContext) -> Option<f64> {
    context
        .track_length
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|m| m.is_finite() && *m > 0.0)
}

/// Coordinate hints for user markers. Numbering follows list position, matching the composited image.
pub fn marker_hints(markers: &[Marker]) -> Vec<String> {
    markers
        .iter()
        .enumerate()
        .map(|(index, marker)| {
            let horizontal = if marker.x < 33.0 {
                "Left"
            } else if marker.x > 66.0 {
                "Right"
            } else {
                "Center"
            };
            let vertical = if marker.y < 33.0 {
                "Top"
            } else if marker.y > 66.0 {
                "Bottom"
            } else {
                "Middle"
            };
            format!(
                "- Marker {}: {}% horizontal, {}% vertical ({}-{})",
                index + 1,
                marker.x.round() as i32,
                marker.y.round() as i32,
                horizontal,
                vertical
            )
        })
        .collect()
}

fn marker_instruction(markers: &[Marker]) -> String {
    if markers.is_empty() {
        return "Identify the key corners automatically and number them 1, 2, 3... in driving order."
            .to_string();
    }

    format!(
        "USER MARKER MODE. The user has drawn red circles with white numbers on the image. \
         Coordinate hints:\n{}\n\
         Analyse only the marked corners. For each marker: locate the red circle, determine which \
         corner it sits on, and emit a corner whose 'number' equals the marker number, with advice \
         and braking zone for that location. In 'name', include the official corner name in brackets, \
         e.g. \"User marker 1 (Suzuka T7 Dunlop)\". The corners array should have one entry per marker. \
         Never renumber: marker 1 is corner 1.",
        marker_hints(markers).join("\n")
    )
}

fn video_instruction(scope: VideoScope) -> &'static str {
    match scope {
        VideoScope::FullLap => {
            "This is onboard or broadcast video. Scan the frames to reconstruct the full lap and \
             analyse every significant corner in order."
        }
        VideoScope::KeyCorners => {
            "This is onboard or broadcast video. Focus only on the key corners where the most lap \
             time is gained or lost."
        }
        VideoScope::SpecificSection => {
            "This is onboard or broadcast video of a specific section. Analyse only the corners \
             visible in the footage, in order."
        }
    }
}

fn output_rules(context: &AnalysisContext) -> String {
    format!(
        "Report:\n\
         1. Circuit name (describe a custom layout if unknown).\n\
         2. Detailed analysis of the key corners: braking point and braking strength adjusted to the \
         vehicle's grip and G limits (an F1 car may be flat-out where a road car brakes heavily).\n\
         3. Suggested gear (1 or direct drive for Formula E and single-speed karts).\n\
         4. Overall setup advice grounded in the reference ranges, with 4-6 concrete items in \
         'detailedSetup' (e.g. component \"Front Wing\", value \"28\", unit \"deg\", trend \"High\").\n\
         5. Estimated times for sectors 1-3 and the full lap. For real circuits, start from the real \
         lap record or qualifying times for this class.\n\
         Follow the JSON schema strictly. 'brakingZone' must be one of Heavy, Medium, Light, Lift, \
         Flat-out. 'difficulty' is an integer 1-10. 'type' describes corner geometry only \
         (hairpin, chicane, high-speed...). Advice is for a {:?} car in {:?} conditions. \
         Never mention turn direction (left/right) in 'type', 'name' or 'advice'.",
        context.vehicle, context.weather
    )
}

/// Response schema in the provider's OpenAPI subset.
pub fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "circuitName": { "type": "STRING", "description": "Name of the track" },
            "locationGuess": { "type": "STRING", "description": "City or country" },
            "totalCorners": { "type": "INTEGER" },
            "overallCharacter": { "type": "STRING", "description": "Short summary of track characteristics" },
            "corners": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "number": { "type": "INTEGER" },
                        "name": { "type": "STRING", "nullable": true },
                        "type": { "type": "STRING", "description": "Corner geometry, no left/right" },
                        "brakingZone": {
                            "type": "STRING",
                            "enum": ["Heavy", "Medium", "Light", "Lift", "Flat-out"]
                        },
                        "difficulty": { "type": "INTEGER" },
                        "advice": { "type": "STRING" },
                        "gear": { "type": "INTEGER", "nullable": true }
                    },
                    "required": ["number", "type", "brakingZone", "advice", "difficulty"]
                }
            },
            "strategy": {
                "type": "OBJECT",
                "properties": {
                    "tireWear": { "type": "STRING" },
                    "keyToWin": { "type": "STRING" },
                    "aeroStrategy": { "type": "STRING" },
                    "pitStrategy": { "type": "STRING" },
                    "overtakingOpportunities": { "type": "STRING" },
                    "setupSuggestion": { "type": "STRING" },
                    "detailedSetup": {
                        "type": "ARRAY",
                        "description": "4-6 specific setup parameters with values",
                        "items": {
                            "type": "OBJECT",
                            "properties": {
                                "component": { "type": "STRING" },
                                "value": { "type": "STRING" },
                                "unit": { "type": "STRING" },
                                "trend": {
                                    "type": "STRING",
                                    "enum": ["Soft", "Medium", "Stiff", "Low", "High", "Balanced"]
                                }
                            },
                            "required": ["component", "value", "trend"]
                        }
                    }
                },
                "required": [
                    "tireWear", "keyToWin", "aeroStrategy", "pitStrategy",
                    "overtakingOpportunities", "setupSuggestion", "detailedSetup"
                ]
            },
            "sectorStats": {
                "type": "OBJECT",
                "properties": {
                    "sector1": sector_schema(),
                    "sector2": sector_schema(),
                    "sector3": sector_schema(),
                    "estimatedLapTime": { "type": "STRING" }
                },
                "required": ["sector1", "sector2", "sector3", "estimatedLapTime"]
            }
        },
        "required": ["circuitName", "corners", "strategy", "overallCharacter", "sectorStats"]
    })
}

fn sector_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "time": { "type": "STRING" },
            "description": { "type": "STRING" }
        },
        "required": ["time", "description"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(id: u32, x: f32, y: f32) -> Marker {
        Marker { id, x, y }
    }

    #[test]
    fn hints_use_list_position_and_quadrants() {
        let hints = marker_hints(&[marker(5, 10.4, 80.0), marker(9, 50.0, 50.0), marker(2, 90.0, 5.0)]);
        assert_eq!(hints[0], "- Marker 1: 10% horizontal, 80% vertical (Left-Bottom)");
        assert_eq!(hints[1], "- Marker 2: 50% horizontal, 50% vertical (Center-Middle)");
        assert_eq!(hints[2], "- Marker 3: 90% horizontal, 5% vertical (Right-Top)");
    }

    #[test]
    fn prompt_includes_markers_for_images() {
        let prompt = build_prompt(
            &AnalysisContext::default(),
            &[marker(1, 20.0, 20.0)],
            MediaKind::Image,
        );
        assert!(prompt.contains("USER MARKER MODE"));
        assert!(prompt.contains("Marker 1: 20% horizontal"));
        assert!(prompt.contains("Formula 1"));
        assert!(prompt.contains("DRY"));
    }

    #[test]
    fn prompt_without_markers_asks_for_auto_numbering() {
        let prompt = build_prompt(&AnalysisContext::default(), &[], MediaKind::Image);
        assert!(prompt.contains("number them 1, 2, 3"));
        assert!(!prompt.contains("USER MARKER MODE"));
    }

    #[test]
    fn video_prompt_uses_scope() {
        let context = AnalysisContext {
            video_scope: VideoScope::KeyCorners,
            ..Default::default()
        };
        let prompt = build_prompt(&context, &[], MediaKind::Video);
        assert!(prompt.contains("key corners"));
        assert!(!prompt.contains("USER MARKER MODE"));
    }

    #[test]
    fn track_length_drives_lap_time_check() {
        let context = AnalysisContext {
            weather: Weather::Wet,
            vehicle: Vehicle::GT3,
            track_name: "Spa".to_string(),
            track_length: "7004".to_string(),
            ..Default::default()
        };
        let prompt = build_prompt(&context, &[], MediaKind::Image);
        assert!(prompt.contains("\"Spa\""));
        assert!(prompt.contains("7.00 km"));
        assert!(prompt.contains("Time = Distance / Speed"));
        assert!(prompt.contains("WET"));
        assert!(prompt.contains("GT3"));
    }

    #[test]
    fn unparseable_length_falls_back() {
        let context = AnalysisContext {
            track_length: "about five km".to_string(),
            ..Default::default()
        };
        let prompt = build_prompt(&context, &[], MediaKind::Image);
        assert!(prompt.contains("was not given"));
    }

    #[test]
    fn schema_lists_braking_enum() {
        let schema = response_schema();
        let zones = &schema["properties"]["corners"]["items"]["properties"]["brakingZone"]["enum"];
        assert_eq!(zones.as_array().unwrap().len(), 5);
        assert_eq!(schema["required"][0], "circuitName");
    }
}
