//! Static keyword tables.
//!
//! Every rule-based stage of the pipeline reads from these tables.  Order
//! matters where noted: the intent table order is the tie-break order, and
//! the unit table is scanned front to back with the first hit winning.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};

use homestock_kernel::{ActionKind, IntentKind};

use crate::error::{IntentError, Result};

/// Intent label → keywords.  Table order is the tie-break order.
pub static INTENT_KEYWORDS: &[(IntentKind, &[&str])] = &[
    (
        IntentKind::InventoryManagement,
        &[
            "库存", "添加", "消耗", "用了", "用掉", "吃了", "剩", "还有", "补充", "入库", "出库",
            "inventory", "stock", "add", "consume", "used up", "remaining",
        ],
    ),
    (
        IntentKind::ProcurementManagement,
        &[
            "采购", "购买", "买", "下单", "订单", "导入", "购物清单", "补货", "purchase", "buy",
            "order", "import", "shopping list",
        ],
    ),
    (
        IntentKind::FinancialAnalysis,
        &[
            "花费", "花了", "支出", "消费", "预算", "账单", "开销", "财务", "分析", "统计",
            "报表", "spend", "budget", "expense", "cost", "finance", "report",
        ],
    ),
    (
        IntentKind::NotificationManagement,
        &[
            "提醒", "通知", "告诉我", "到期", "过期", "预警", "remind", "notify", "notification",
            "alert", "expire",
        ],
    ),
    (
        IntentKind::QueryInformation,
        &[
            "查询", "查看", "查一下", "多少", "哪些", "有没有", "是否", "query", "show", "list",
            "how many", "how much", "check",
        ],
    ),
    (
        IntentKind::HelpRequest,
        &[
            "帮助", "怎么用", "如何使用", "能做什么", "使用说明", "help", "usage",
            "what can you do",
        ],
    ),
];

/// Household items recognised as `item_name`.
pub static ITEMS: &[&str] = &[
    "抽纸", "卫生纸", "纸巾", "湿巾", "牛奶", "酸奶", "鸡蛋", "大米", "面粉", "面条", "食用油",
    "酱油", "醋", "盐", "糖", "洗衣液", "洗衣粉", "洗洁精", "洗发水", "沐浴露", "牙膏", "牙刷",
    "垃圾袋", "保鲜膜", "矿泉水", "咖啡", "茶叶", "面包", "苹果", "香蕉", "猫粮", "狗粮",
    "猫砂", "尿不湿", "电池", "milk", "eggs", "rice", "coffee", "toilet paper", "tissues",
    "detergent", "shampoo", "toothpaste",
];

/// Action verbs and their normalised kind.
pub static ACTIONS: &[(&str, ActionKind)] = &[
    ("添加", ActionKind::Add),
    ("加入", ActionKind::Add),
    ("买了", ActionKind::Add),
    ("入库", ActionKind::Add),
    ("补充", ActionKind::Add),
    ("add", ActionKind::Add),
    ("消耗", ActionKind::Consume),
    ("用了", ActionKind::Consume),
    ("用掉", ActionKind::Consume),
    ("吃了", ActionKind::Consume),
    ("出库", ActionKind::Consume),
    ("consume", ActionKind::Consume),
    ("修改", ActionKind::Update),
    ("更新", ActionKind::Update),
    ("调整", ActionKind::Update),
    ("update", ActionKind::Update),
    ("删除", ActionKind::Delete),
    ("移除", ActionKind::Delete),
    ("delete", ActionKind::Delete),
    ("remove", ActionKind::Delete),
    ("查询", ActionKind::Query),
    ("查看", ActionKind::Query),
    ("查一下", ActionKind::Query),
    ("query", ActionKind::Query),
    ("导入", ActionKind::Import),
    ("import", ActionKind::Import),
    ("分析", ActionKind::Analyze),
    ("统计", ActionKind::Analyze),
    ("analyze", ActionKind::Analyze),
    ("提醒", ActionKind::Notify),
    ("通知", ActionKind::Notify),
    ("remind", ActionKind::Notify),
    ("notify", ActionKind::Notify),
];

/// Shopping platforms recognised as `platform`.
pub static PLATFORMS: &[&str] = &[
    "淘宝", "天猫", "京东", "拼多多", "美团", "盒马", "山姆", "叮咚", "taobao", "tmall", "jd.com",
    "pinduoduo", "amazon",
];

/// Units, scanned in this order; compound units precede their suffixes.
pub static UNITS: &[&str] = &[
    "包", "瓶", "盒", "袋", "箱", "罐", "桶", "卷", "支", "条", "提", "件", "个", "公斤", "千克",
    "斤", "毫升", "升", "克", "pack", "bottle", "box", "bag", "kg",
];

/// Named time periods recognised as `time_period`.
pub static TIME_PERIODS: &[&str] = &[
    "今天", "昨天", "本周", "这周", "上周", "本月", "这个月", "上个月", "今年", "去年",
    "最近一周", "最近一个月", "today", "yesterday", "this week", "last week", "this month",
    "last month", "this year", "last year",
];

/// Pronouns that can be resolved from the conversation's last item.
pub static PRONOUNS: &[&str] = &["它们", "它", "这个", "那个", "this one", "that one", "it"];

/// Vague quantifiers that always need context.
pub static QUANTIFIERS: &[&str] = &["一些", "几个", "一点儿", "some", "a few"];

/// Relative time references that always need context.
pub static TIME_RELATIVES: &[&str] = &["最近", "上次", "之前", "前几天", "recently", "last time"];

/// Chinese numerals accepted in front of a unit (`两包`, `三瓶`).
pub(crate) fn chinese_numeral(c: char) -> Option<f64> {
    Some(match c {
        '一' => 1.0,
        '二' | '两' => 2.0,
        '三' => 3.0,
        '四' => 4.0,
        '五' => 5.0,
        '六' => 6.0,
        '七' => 7.0,
        '八' => 8.0,
        '九' => 9.0,
        '十' => 10.0,
        _ => return None,
    })
}

/// Look up the normalised kind of an action verb.
pub fn action_kind(verb: &str) -> Option<ActionKind> {
    let lowered = verb.to_lowercase();
    ACTIONS
        .iter()
        .find(|(v, _)| *v == lowered)
        .map(|(_, kind)| *kind)
}

/// Whether `text` is nothing but an action verb.
pub fn is_bare_action(text: &str) -> bool {
    action_kind(text.trim()).is_some()
}

/// Compile a leftmost-longest, ASCII case-insensitive matcher.
pub(crate) fn matcher(name: &'static str, patterns: &[&str]) -> Result<AhoCorasick> {
    AhoCorasickBuilder::new()
        .ascii_case_insensitive(true)
        .match_kind(MatchKind::LeftmostLongest)
        .build(patterns)
        .map_err(|e| IntentError::Automaton {
            name,
            reason: e.to_string(),
        })
}

/// Replace every match of `ac` in `text` with a single space.
pub(crate) fn mask(ac: &AhoCorasick, text: &str) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    ac.try_replace_all_with(text, &mut out, |_, _, dst| {
        dst.push(' ');
        true
    })?;
    Ok(out)
}
