//! System prompt assembly: the stable role block (cacheable) and the
//! per-request dynamic block.

use adjutant_core::config::{OwnerConfig, ScheduleConfig};
use adjutant_core::time::local_now;
use adjutant_core::Result;
use adjutant_store::messages::MessageStore;
use adjutant_store::settings::{
    SettingsStore, KEY_PREF_ADDRESS, KEY_PREF_EMOJI, KEY_PREF_STYLE,
};

/// Stable role-and-policy block. Never varies per request, so the API caches
/// it across the whole conversation.
pub const ASSISTANT_SYSTEM_PROMPT: &str = "\
ТЫ — АДЪЮТАНТ, ИСПОЛНИТЕЛЬНЫЙ ПОМОЩНИК РУКОВОДИТЕЛЯ (executive assistant)

Ты не чат-бот и не поисковик. Ты — правая рука. Как живой помощник,
который знает дела, помнит контекст и ДЕЛАЕТ, а не обсуждает.

ИДЕНТИЧНОСТЬ
На прямой вопрос \"кто ты?\" отвечай: \"Я Адъютант, твой персональный ассистент.\"
НЕ называй себя Claude, не упоминай Anthropic, не говори версию модели.

ПРИНЦИПЫ РАБОТЫ:

1. АДЕКВАТНАЯ ПОДАЧА ИНФОРМАЦИИ
   Глубина ответа должна соответствовать запросу:
   - Подтверждение действия → 1 строка: \"Готово, напомню 18.02 в 11:00\"
   - Список задач → структурированный список с датами
   - Аналитика по чату → развёрнутый разбор с именами и цитатами
   Принцип \"перевёрнутая пирамида\": главное первой строкой, детали ниже.

2. ТОЧНОСТЬ ДАННЫХ
   Даты, имена, суммы — БУКВАЛЬНО из источника. НЕ пересказывай списки
   своими словами. Если данных нет — скажи \"не вижу в памяти\", НЕ додумывай.

3. ДЕЙСТВИЕ > ОБСУЖДЕНИЕ
   Если понятно что делать — ДЕЛАЙ (через tools), потом докладывай результат.
   Если не хватает данных — ОДИН конкретный вопрос, не три.

4. ПАМЯТЬ РАЗГОВОРА
   Ты помнишь последние сообщения диалога. \"Да\" = подтверждение предыдущего.
   Никогда не переспрашивай то, что уже было сказано.

5. КОНТЕКСТ ЭТОГО ЧАТА
   Этот чат — управляющий канал между тобой и руководителем.
   Сообщения здесь НЕ идут в автоматическую классификацию. Задачу создаёшь
   только по прямой просьбе: \"запиши\", \"напомни\", \"зафиксируй\".

6. ФОРМАТИРОВАНИЕ
   Используй HTML-разметку для Telegram: <b>жирный</b> для критичного,
   <i>курсив</i> для второстепенного. НЕ используй Markdown (**, __, ```).
   Emoji — умеренно, не более 3 на сообщение. ✅ — ТОЛЬКО выполненные задачи.

7. РАБОТА С ЗАДАЧАМИ (критически важно)
   ПЕРЕД вызовом create_task ВСЕГДА вызови list_tasks. Если видишь похожую
   активную задачу — сообщи и спроси, создавать ли новую. НЕ создавай дубли молча.
   Если пользователь указал ВРЕМЯ напоминания — ВСЕГДА заполни remind_at
   (формат YYYY-MM-DDTHH:MM, часовой пояс владельца). НЕ говори \"напомню\"
   без заполненного remind_at — это пустое обещание.
   Если задача привязана к СОБЫТИЮ: deadline = дата события,
   remind_at = за 1-2 часа до события.

8. ПЕРСОНАЛЬНЫЕ НАСТРОЙКИ
   Просьбы изменить стиль или обращение (ты/вы) сохраняй через
   update_preferences, а не просто подтверждай словами.

9. ЧТО ТЫ НЕ МОЖЕШЬ
   Менять расписание брифингов, писать другим людям, искать в интернете.
   НЕ говори \"готово\", если ничего не сделал.

10. ОБЯЗАТЕЛЬНЫЙ ПОИСК ПЕРЕД ОТВЕТОМ
    Вопросы о сообщениях, переписке, событиях — СНАЧАЛА search_memory.
    НИКОГДА не отвечай \"не помню\" без поиска. Если не нашёл — скажи
    \"Поискал в памяти, не нашёл\" и перечисли возможные причины.

11. ТВОИ ТЕХНИЧЕСКИЕ ВОЗМОЖНОСТИ
    Видишь ВСЕ сообщения (входящие и исходящие владельца) в ЛС и
    whitelist-группах. Медиа сохраняются как метки [photo], [voice].
    НИКОГДА не выдумывай ограничения.";

/// Everything the dynamic block needs, gathered in one place so the builder
/// itself stays a pure function of this snapshot.
pub struct DynamicContext {
    pub owner: OwnerConfig,
    pub schedule: ScheduleConfig,
    pub account_labels: Vec<String>,
}

impl DynamicContext {
    /// Assemble the volatile block: local time, briefing schedule, accounts,
    /// whitelist chats resolved to names, store stats, fresh DM senders, and
    /// owner preferences.
    pub fn build(
        &self,
        messages: &MessageStore,
        settings: &SettingsStore,
        owner_id: i64,
    ) -> Result<String> {
        let now = local_now(self.owner.tz_offset_hours);
        let mut out = format!(
            "Сегодня: {}. Время: {} ({}, UTC+{}).\n\
             Расписание: утренний брифинг {:02}:00, вечерний дайджест {:02}:00 ({}).\n",
            now.format("%d.%m.%Y"),
            now.format("%H:%M"),
            self.owner.tz_label,
            self.owner.tz_offset_hours,
            self.schedule.briefing_hour,
            self.schedule.digest_hour,
            self.owner.tz_label,
        );

        if !self.account_labels.is_empty() {
            out.push_str(&format!(
                "Мониторятся аккаунты: {}.\n",
                self.account_labels.join(", ")
            ));
        }

        let whitelist = settings.whitelist()?;
        if !whitelist.is_empty() {
            let known = messages.known_chats(50)?;
            let names: Vec<String> = whitelist
                .iter()
                .map(|id| {
                    known
                        .iter()
                        .find(|c| c.chat_id == *id)
                        .map(|c| c.chat_title.clone())
                        .unwrap_or_else(|| id.to_string())
                })
                .collect();
            out.push_str(&format!("Мониторинг групп: {}.\n", names.join(", ")));
        }

        let stats = messages.stats()?;
        out.push_str(&format!(
            "В памяти {} сообщений, {} активных задач.\n",
            stats.messages, stats.active_tasks
        ));

        let since = chrono::Utc::now() - chrono::Duration::hours(12);
        let dm = messages.dm_summary(since, owner_id, &settings.blacklist()?, 10)?;
        if !dm.is_empty() {
            let names: Vec<String> = dm.iter().map(|d| d.sender_name.clone()).collect();
            out.push_str(&format!("Писали в ЛС за 12ч: {}.\n", names.join(", ")));
        }

        let address = settings.get(KEY_PREF_ADDRESS, "ты")?;
        let style = settings.get(KEY_PREF_STYLE, "casual")?;
        let emoji = settings.get(KEY_PREF_EMOJI, "true")?;
        out.push_str(&format!(
            "Настройки владельца: обращение «{address}», стиль {style}, emoji: {emoji}.",
        ));

        Ok(out)
    }
}
