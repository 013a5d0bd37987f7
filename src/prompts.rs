//! Prompt templates for the analyst, critic and illustrator passes.
//!
//! Templates use `{{name}}` placeholders filled by [`render`]. The JSON schema
//! described in [`ANALYZE_USER`] is the one [`crate::models::AnalyzedRecord`]
//! deserializes.

pub const ANALYZE_SYSTEM: &str = "\
당신은 한국 경제 뉴스를 일반 독자에게 설명하는 금융 전문 에디터입니다.
주어진 기사 본문만을 근거로 사실을 정리하고, 본문에 없는 수치나 사건을 지어내지 마십시오.
응답은 반드시 JSON 배열 하나로만 작성하고, 설명 문장이나 마크다운을 덧붙이지 마십시오.";

pub const ANALYZE_USER: &str = "\
오늘 날짜는 {{today_date}}입니다. {{past_date}} 이전의 사건을 최신 소식처럼 다루지 마십시오.

아래 기사를 분석하여 다음 형식의 JSON 배열로 답하십시오.

[
  {
    \"title\": \"기사 제목\",
    \"summary\": \"핵심 내용을 3~5문장으로 요약\",
    \"key_metrics\": \"기사에 나온 주요 수치 (예: 기준금리 3.50%, 코스피 2,600)\",
    \"source_url\": \"기사 URL (알 수 없으면 빈 문자열)\",
    \"date\": \"YYYY-MM-DD\",
    \"terms\": [
      {
        \"term\": \"경제 용어\",
        \"definition\": \"한 문장 정의\",
        \"explanation\": \"이 기사 맥락에서의 쉬운 설명\"
      }
    ]
  }
]

규칙:
- terms에는 일반 독자가 어려워할 경제 용어를 3개 이상 5개 이하로 넣으십시오.
- 같은 용어를 두 번 넣지 마십시오.

기사 본문:
{{input_text}}";

pub const CRITIC_SYSTEM: &str = "\
당신은 경제 뉴스 요약을 검수하는 편집장입니다.
요약이 과장되거나 본문과 어긋나지 않는지, 용어 설명이 정확한지 확인하고 필요한 부분만 고치십시오.
입력과 같은 구조의 JSON 배열 하나로만 답하십시오.";

pub const CRITIC_USER: &str = "\
다음 분석 결과를 검수하십시오.

- 요약은 3~5문장을 유지하십시오.
- terms가 3개보다 적으면 보충하고, 5개보다 많으면 가장 중요한 5개만 남기십시오.
- 잘못된 정의나 설명은 바로잡으십시오.
- 필드 이름과 구조는 바꾸지 마십시오.

{{input_json}}";

pub const IMAGE_PROMPT: &str = "\
You are an expert AI Art Director.
Create a detailed, high-quality, English image generation prompt based on the following news summary.
The image should be:
- Futuristic, high-tech, and professional financial style.
- 3D render or digital art style.
- NO TEXT in the image.
- Visually representing the key topic (e.g., semiconductor, gold bars, rising graph, AI brain, EV car, etc.).

News Summary:
\"{{summary}}\"

Output ONLY the English prompt string. No explanations.";

/// Used whenever the art-director pass fails.
pub const FALLBACK_IMAGE_PROMPT: &str =
    "futuristic digital art representing financial news, high tech, 4k";

/// Replace each `{{key}}` in `template` with its value.
///
/// Keys are substituted in the order given, so placeholders appearing inside an
/// inserted value are only expanded by later keys. Article text goes last.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{{{key}}}}}"), value)
    })
}
