use phf::phf_map;
use serde::{Deserialize, Serialize};

/// 医学专科枚举（封闭词表）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Specialty {
    /// 心脏病学
    Cardiology,
    /// 肿瘤学
    Oncology,
    /// 放射学
    Radiology,
    /// 神经病学
    Neurology,
    /// 外科
    Surgery,
    /// 精神病学
    Psychiatry,
    /// 内分泌学
    Endocrinology,
    /// 全科医学
    #[serde(rename = "General Medicine")]
    GeneralMedicine,
    /// 其他
    Other,
}

/// 常见别名（小写）到专科的映射
static ALIASES: phf::Map<&'static str, Specialty> = phf_map! {
    "cardiology" => Specialty::Cardiology,
    "cardiovascular" => Specialty::Cardiology,
    "cardiac" => Specialty::Cardiology,
    "oncology" => Specialty::Oncology,
    "cancer" => Specialty::Oncology,
    "hematology/oncology" => Specialty::Oncology,
    "radiology" => Specialty::Radiology,
    "medical imaging" => Specialty::Radiology,
    "imaging" => Specialty::Radiology,
    "neurology" => Specialty::Neurology,
    "neuroscience" => Specialty::Neurology,
    "surgery" => Specialty::Surgery,
    "surgical" => Specialty::Surgery,
    "psychiatry" => Specialty::Psychiatry,
    "mental health" => Specialty::Psychiatry,
    "endocrinology" => Specialty::Endocrinology,
    "diabetes" => Specialty::Endocrinology,
    "general medicine" => Specialty::GeneralMedicine,
    "internal medicine" => Specialty::GeneralMedicine,
    "general practice" => Specialty::GeneralMedicine,
    "other" => Specialty::Other,
};

impl Specialty {
    /// 全部专科，按固定顺序
    pub const ALL: [Specialty; 9] = [
        Specialty::Cardiology,
        Specialty::Oncology,
        Specialty::Radiology,
        Specialty::Neurology,
        Specialty::Surgery,
        Specialty::Psychiatry,
        Specialty::Endocrinology,
        Specialty::GeneralMedicine,
        Specialty::Other,
    ];

    /// 获取标准名称
    pub fn name(self) -> &'static str {
        match self {
            Specialty::Cardiology => "Cardiology",
            Specialty::Oncology => "Oncology",
            Specialty::Radiology => "Radiology",
            Specialty::Neurology => "Neurology",
            Specialty::Surgery => "Surgery",
            Specialty::Psychiatry => "Psychiatry",
            Specialty::Endocrinology => "Endocrinology",
            Specialty::GeneralMedicine => "General Medicine",
            Specialty::Other => "Other",
        }
    }

    /// 尝试从字符串解析专科（标准名称或别名，忽略大小写）
    pub fn parse(s: &str) -> Option<Self> {
        let key = s
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == '*')
            .trim()
            .to_lowercase();
        ALIASES.get(key.as_str()).copied()
    }

    /// 智能查找专科（支持模糊匹配）
    pub fn find(s: &str) -> Option<Self> {
        // 先尝试精确匹配
        if let Some(specialty) = Self::parse(s) {
            return Some(specialty);
        }

        // 模糊匹配：标准名称优先，其次别名；"other" 不参与，避免误判
        let s_lower = s.to_lowercase();
        if let Some(specialty) = Self::ALL
            .iter()
            .copied()
            .filter(|sp| *sp != Specialty::Other)
            .find(|sp| s_lower.contains(&sp.name().to_lowercase()))
        {
            return Some(specialty);
        }

        let mut aliases: Vec<(&str, Specialty)> = ALIASES
            .entries()
            .filter(|(_, sp)| **sp != Specialty::Other)
            .map(|(alias, sp)| (*alias, *sp))
            .collect();
        // 长别名优先，结果与哈希顺序无关
        aliases.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(b.0)));
        aliases
            .into_iter()
            .find(|(alias, _)| s_lower.contains(alias))
            .map(|(_, sp)| sp)
    }

    /// 归一化模型返回的标签，无法识别时使用默认专科
    pub fn normalize(label: &str, default: Specialty) -> Self {
        Self::find(label).unwrap_or(default)
    }
}

impl std::fmt::Display for Specialty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
