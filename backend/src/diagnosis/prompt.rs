pub const NOT_A_PLANT: &str = "Not a Plant";

pub const DIAGNOSIS_PROMPT: &str = r#"Analyze this plant image for diseases.
Return ONLY a valid JSON object (no markdown, no backticks) with this structure:
{
  "disease": "Name of disease or 'Healthy'",
  "confidence": number (0-100),
  "severity": "Low" | "Moderate" | "High" (if healthy, use "None"),
  "description": "Brief explanation of the condition",
  "symptoms": ["symptom1", "symptom2"],
  "remedies": ["remedy1", "remedy2"],
  "prevention": ["prevention1", "prevention2"]
}
If the image is not a plant, return:
{
  "disease": "Not a Plant",
  "confidence": 0,
  "severity": "None",
  "description": "Please upload a clear image of a plant leaf or crop.",
  "symptoms": [],
  "remedies": [],
  "prevention": []
}"#;
